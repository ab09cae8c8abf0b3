//! Request classification.

use http::Method;

use crate::config::WorkerConfig;
use crate::request::{Destination, Request};

/// Class of an intercepted request. Decides the fetch strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// Page navigations.
    Document,
    /// Anything served from a font host.
    Font,
    /// Same-origin styles, scripts and images.
    StaticAsset,
    Other,
}

/// Classify a request, or return `None` to let it go to the network untouched.
///
/// Only GET requests are intercepted. Cross-origin requests are intercepted
/// only when they hit a configured font host.
pub fn classify(request: &Request, config: &WorkerConfig) -> Option<ResourceClass> {
    if request.method != Method::GET {
        return None;
    }

    let url = request.url.as_str();
    let font_host = config.font_hosts.iter().any(|host| url.contains(host.as_str()));
    let same_origin = request.url.origin() == config.origin.origin();

    if !same_origin && !font_host {
        return None;
    }

    let class = if request.destination == Destination::Document {
        ResourceClass::Document
    } else if font_host {
        ResourceClass::Font
    } else if matches!(
        request.destination,
        Destination::Style | Destination::Script | Destination::Image
    ) {
        ResourceClass::StaticAsset
    } else {
        ResourceClass::Other
    };

    Some(class)
}
