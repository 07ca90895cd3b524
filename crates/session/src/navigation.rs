//! Navigation side effects of the session lifecycle

use log::info;
use std::sync::{Arc, Mutex};

/// A page the session lifecycle sends the user to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SignIn,
    Dashboard,
}

/// Receives navigation requests, e.g. a router or a UI shell
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route, path: &str);
}

/// Navigator that only logs, for headless clients
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, route: Route, path: &str) {
        info!("Navigating to {:?} ({})", route, path);
    }
}

/// Navigator that records every request in order
#[derive(Debug, Default, Clone)]
pub struct RouteHistory {
    routes: Arc<Mutex<Vec<Route>>>,
}

impl RouteHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<Route> {
        self.routes().last().copied()
    }

    /// How many times `route` was requested
    pub fn count(&self, route: Route) -> usize {
        self.routes().iter().filter(|r| **r == route).count()
    }
}

impl Navigator for RouteHistory {
    fn navigate(&self, route: Route, _path: &str) {
        self.routes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(route);
    }
}
