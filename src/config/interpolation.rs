use super::ConfigError;

/// Resolve `${VAR_NAME}` references in a string from environment variables.
///
/// # Errors
///
/// Returns [`ConfigError::Interpolation`] if a referenced variable is not set.
pub fn resolve_variables(input: &str) -> Result<String, ConfigError> {
    resolve_variables_with(input, |name| std::env::var(name).ok())
}

pub(crate) fn resolve_variables_with<F>(input: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find('}') else {
            // Unterminated reference, keep literally.
            result.push_str(&rest[start..]);
            return Ok(result);
        };
        let name = &after_open[..end];
        if name.is_empty() {
            result.push_str("${}");
        } else {
            let value = lookup(name).ok_or_else(|| ConfigError::Interpolation {
                name: name.to_string(),
            })?;
            result.push_str(&value);
        }
        rest = &after_open[end + 1..];
    }
    result.push_str(rest);
    Ok(result)
}
