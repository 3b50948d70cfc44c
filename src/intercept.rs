use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::{
    domain::Domain,
    matcher::{first_match, DomainMirror},
};

// request interception exposed by the host environment

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Fetch,
    XmlHttpRequest,
    Image,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Fetch => "fetch",
            RequestKind::XmlHttpRequest => "xmlhttprequest",
            RequestKind::Image => "image",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OutgoingRequest<'a> {
    pub kind: RequestKind,
    pub url: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Block(Domain),
}

/// Error returned to the page when a request is refused before dispatch.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{kind} request to {url} blocked ({domain} is on the block list)")]
pub struct RequestBlocked {
    pub kind: RequestKind,
    pub url: String,
    pub domain: Domain,
}

/// Consulted for every outgoing request before it reaches the network.
pub trait RequestFilter: Send + Sync {
    fn check(&self, request: &OutgoingRequest<'_>) -> Verdict;
}

/// Capability of a host environment to route requests through a filter.
pub trait InterceptionHost {
    fn register_request_filter(&mut self, filter: Arc<dyn RequestFilter>);
}

/// Filter backed by the live blocked-domain mirror.
#[derive(Debug, Clone)]
pub struct RequestInterceptor {
    mirror: DomainMirror,
}

impl RequestInterceptor {
    pub fn new(mirror: DomainMirror) -> Self {
        Self { mirror }
    }

    pub fn install<H: InterceptionHost + ?Sized>(self, host: &mut H) {
        host.register_request_filter(Arc::new(self));
    }

    /// Fails fast with [`RequestBlocked`] instead of letting the request out.
    pub fn guard(&self, request: &OutgoingRequest<'_>) -> Result<(), RequestBlocked> {
        match self.check(request) {
            Verdict::Allow => Ok(()),
            Verdict::Block(domain) => Err(RequestBlocked {
                kind: request.kind,
                url: request.url.to_string(),
                domain,
            }),
        }
    }
}

impl RequestFilter for RequestInterceptor {
    fn check(&self, request: &OutgoingRequest<'_>) -> Verdict {
        let snapshot = self.mirror.snapshot();
        match first_match(&snapshot, request.url) {
            Some(domain) => {
                tracing::debug!(kind = %request.kind, url = %request.url, domain = %domain, "blocked outgoing request");
                Verdict::Block(domain.clone())
            }
            None => Verdict::Allow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeHost {
        filters: Vec<Arc<dyn RequestFilter>>,
    }

    impl InterceptionHost for FakeHost {
        fn register_request_filter(&mut self, filter: Arc<dyn RequestFilter>) {
            self.filters.push(filter);
        }
    }

    impl FakeHost {
        fn dispatch(&self, kind: RequestKind, url: &str) -> Result<&'static str, Domain> {
            let request = OutgoingRequest { kind, url };
            for filter in &self.filters {
                if let Verdict::Block(domain) = filter.check(&request) {
                    return Err(domain);
                }
            }
            Ok("sent")
        }
    }

    fn mirror(list: &[&str]) -> DomainMirror {
        DomainMirror::fixed(list.iter().map(|d| Domain::parse(d).unwrap()).collect())
    }

    #[test]
    fn registered_filter_sees_every_request() {
        let mut host = FakeHost::default();
        RequestInterceptor::new(mirror(&["tracker.net"])).install(&mut host);

        assert_eq!(host.dispatch(RequestKind::Fetch, "https://api.site.test/data"), Ok("sent"));
        let blocked = host
            .dispatch(RequestKind::Image, "https://px.tracker.net/p.gif")
            .unwrap_err();
        assert_eq!(blocked.as_str(), "tracker.net");
        assert!(host
            .dispatch(RequestKind::XmlHttpRequest, "/collect?u=tracker.net")
            .is_err());
    }

    #[test]
    fn guard_fails_fast() {
        let interceptor = RequestInterceptor::new(mirror(&["example.com"]));
        let request = OutgoingRequest {
            kind: RequestKind::Fetch,
            url: "https://example.com/api",
        };
        let err = interceptor.guard(&request).unwrap_err();
        assert_eq!(err.domain.as_str(), "example.com");
        assert_eq!(
            err.to_string(),
            "fetch request to https://example.com/api blocked (example.com is on the block list)"
        );

        let allowed = OutgoingRequest {
            kind: RequestKind::Fetch,
            url: "https://example.org/api",
        };
        assert!(interceptor.guard(&allowed).is_ok());
    }
}
