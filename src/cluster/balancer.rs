//! Sticky-session policy.

use crate::config::BalancerConfig;
use crate::http::RequestHead;

/// A named sticky-session policy grouping nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balancer {
    config: BalancerConfig,
}

impl Balancer {
    pub fn new(config: BalancerConfig) -> Self {
        Self { config }
    }

    /// Default policy for a balancer only known through a node reference.
    pub fn named(name: &str) -> Self {
        Self::new(BalancerConfig {
            name: name.to_string(),
            ..BalancerConfig::default()
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn sticky_session(&self) -> bool {
        self.config.sticky_session
    }

    pub fn sticky_cookie(&self) -> &str {
        &self.config.sticky_session_cookie
    }

    pub fn sticky_force(&self) -> bool {
        self.config.sticky_session_force
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Session value this balancer would route on: the sticky cookie, else
    /// the sticky path parameter.
    pub fn session_value<'a>(&self, request: &'a RequestHead) -> Option<&'a str> {
        if !self.config.sticky_session {
            return None;
        }
        request
            .cookie(&self.config.sticky_session_cookie)
            .or_else(|| request.path_parameter(&self.config.sticky_session_path))
    }
}

/// Route id encoded as the trailing `.<route>` of a session value.
pub fn route_from_session(value: &str) -> Option<&str> {
    match value.rsplit_once('.') {
        Some((_, route)) if !route.is_empty() => Some(route),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_route_suffix() {
        assert_eq!(route_from_session("abc123.nodeA"), Some("nodeA"));
        assert_eq!(route_from_session("a.b.nodeB"), Some("nodeB"));
        assert_eq!(route_from_session("abc123"), None);
        assert_eq!(route_from_session("abc123."), None);
    }

    #[test]
    fn session_value_prefers_cookie() {
        let balancer = Balancer::named("web");
        let head = RequestHead::parse(
            b"GET /x;jsessionid=p.path HTTP/1.1\r\nCookie: JSESSIONID=c.cookie\r\n\r\n",
        )
        .unwrap()
        .unwrap();
        assert_eq!(balancer.session_value(&head), Some("c.cookie"));

        let head = RequestHead::parse(b"GET /x;jsessionid=p.path HTTP/1.1\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(balancer.session_value(&head), Some("p.path"));
    }

    #[test]
    fn non_sticky_balancer_ignores_cookie() {
        let balancer = Balancer::new(BalancerConfig {
            sticky_session: false,
            ..BalancerConfig::default()
        });
        let head = RequestHead::parse(b"GET / HTTP/1.1\r\nCookie: JSESSIONID=c.n\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(balancer.session_value(&head), None);
    }
}
