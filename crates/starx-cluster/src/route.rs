//! Route parsing and locality classification.
//!
//! A route names the server type that owns a handler followed by the handler
//! path, e.g. `"game.room.join"`: server type `game`, handler path
//! `room.join`. Whether a route is local depends only on the server type of
//! the node doing the classification.

use crate::config::NodeConfig;
use crate::error::{Result, StarxError};
use std::fmt;

/// A parsed `<serverType>.<handlerPath>` route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteInfo {
    server_type: String,
    handler: String,
}

/// Where a route executes relative to the classifying node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    Local,
    Remote,
}

impl RouteInfo {
    /// Parse a dotted route string.
    pub fn parse(route: &str) -> Result<Self> {
        let malformed = |reason: &str| StarxError::MalformedRoute {
            route: route.to_string(),
            reason: reason.to_string(),
        };

        let (server_type, handler) = route
            .split_once('.')
            .ok_or_else(|| malformed("missing '.' separator"))?;

        if server_type.trim().is_empty() {
            return Err(malformed("empty server type"));
        }
        if server_type.trim() != server_type {
            return Err(malformed("whitespace around server type"));
        }
        if handler.is_empty() || handler.split('.').any(str::is_empty) {
            return Err(malformed("empty handler path segment"));
        }

        Ok(Self {
            server_type: server_type.to_string(),
            handler: handler.to_string(),
        })
    }

    /// Server type (node role) that owns the handler.
    pub fn server_type(&self) -> &str {
        &self.server_type
    }

    /// Handler path below the server type.
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Service name when the handler path has the `<service>.<method>` shape.
    pub fn service(&self) -> Option<&str> {
        self.handler.rsplit_once('.').map(|(service, _)| service)
    }

    /// Method name: the last handler path segment.
    pub fn method(&self) -> &str {
        self.handler
            .rsplit_once('.')
            .map(|(_, method)| method)
            .unwrap_or(&self.handler)
    }

    /// Classify this route relative to a node.
    pub fn classify(&self, config: &NodeConfig) -> Locality {
        if self.server_type == config.server_type {
            Locality::Local
        } else {
            Locality::Remote
        }
    }

    pub fn is_local(&self, config: &NodeConfig) -> bool {
        self.classify(config) == Locality::Local
    }
}

impl fmt::Display for RouteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.server_type, self.handler)
    }
}

impl std::str::FromStr for RouteInfo {
    type Err = StarxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
