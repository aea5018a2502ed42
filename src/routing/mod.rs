pub mod dispatch;

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::config::AppConfig;

/// Where a public model id ends up upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTarget<'a> {
    pub upstream_model: &'a str,
    /// The route asks for extended reasoning.
    pub thinking: bool,
    pub source: RouteSource,
}

/// How a request's model id was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    /// Found in the route table.
    Table,
    /// Looked provider-native (`vendor/model`) and was forwarded unchanged.
    Passthrough,
    /// Unknown; replaced by the default model.
    Default,
}

#[derive(Debug, Clone)]
struct Route {
    upstream_model: Arc<str>,
    thinking: bool,
}

/// Static public -> upstream model table, read-only after startup.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    routes: FxHashMap<String, Route>,
    /// Public ids in configuration order, for listings.
    public_ids: Vec<Arc<str>>,
    default_model: Arc<str>,
}

impl ModelRouter {
    /// Build the router from the `models` section of the configuration.
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        let models = &config.models;
        let mut routes = FxHashMap::default();
        let mut public_ids = Vec::with_capacity(models.routes.len());
        for route in &models.routes {
            let public = route.public.trim();
            let previous = routes.insert(
                public.to_string(),
                Route {
                    upstream_model: Arc::from(route.internal.trim()),
                    thinking: route.thinking,
                },
            );
            if previous.is_none() {
                public_ids.push(Arc::from(public));
            }
        }

        Self {
            routes,
            public_ids,
            default_model: Arc::from(models.default_model.trim()),
        }
    }

    /// Resolve the upstream model for a requested public id.
    ///
    /// Never fails: ids containing `/` that are not in the table are taken to be
    /// provider-native and forwarded as-is; anything else unknown (including
    /// the empty id) falls back to the default model.
    #[must_use]
    pub fn resolve<'a>(&'a self, model: &'a str) -> RouteTarget<'a> {
        if let Some(route) = self.routes.get(model) {
            return RouteTarget {
                upstream_model: &route.upstream_model,
                thinking: route.thinking,
                source: RouteSource::Table,
            };
        }
        if model.contains('/') {
            return RouteTarget {
                upstream_model: model,
                thinking: false,
                source: RouteSource::Passthrough,
            };
        }
        RouteTarget {
            upstream_model: &self.default_model,
            thinking: false,
            source: RouteSource::Default,
        }
    }

    #[must_use]
    pub fn public_ids(&self) -> &[Arc<str>] {
        &self.public_ids
    }

    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}
