use crate::router::RouterError;

/// The url pattern of a route.
///
/// - `/path` matches `/path` itself and everything below `/path/`
/// - `/path*` matches every url starting with `/path`
/// - `/*.ext` matches every url ending with `.ext`
/// - `/led/{id}` matches one url segment per `{name}` and records the
///   captured segments as the request's path arguments
/// - the empty pattern matches everything
pub(crate) enum UrlPattern {
    Exact(String),
    Prefix(String),
    Extension(String),
    Captures(matchit::Router<()>),
}

impl UrlPattern {
    pub(crate) fn parse(pattern: &str) -> Result<Self, RouterError> {
        if pattern.contains('{') {
            let mut router = matchit::Router::new();
            router.insert(pattern, ()).map_err(|e| RouterError::invalid_pattern(pattern, e))?;
            return Ok(Self::Captures(router));
        }

        if let Some(extension) = pattern.strip_prefix("/*.") {
            return Ok(Self::Extension(format!(".{extension}")));
        }

        if let Some(prefix) = pattern.strip_suffix('*') {
            return Ok(Self::Prefix(prefix.to_string()));
        }

        Ok(Self::Exact(pattern.to_string()))
    }

    /// The captured segments if `url` matches, in pattern order.
    pub(crate) fn matches(&self, url: &str) -> Option<Vec<String>> {
        let matched = match self {
            Self::Exact(path) => {
                path.is_empty()
                    || url == path
                    || url.strip_prefix(path.as_str()).is_some_and(|rest| rest.starts_with('/'))
            }
            Self::Prefix(prefix) => url.starts_with(prefix.as_str()),
            Self::Extension(extension) => url.ends_with(extension.as_str()),
            Self::Captures(router) => {
                let matched = router.at(url).ok()?;
                return Some(matched.params.iter().map(|(_, value)| value.to_string()).collect());
            }
        };

        matched.then(Vec::new)
    }
}

impl std::fmt::Debug for UrlPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(path) => f.debug_tuple("Exact").field(path).finish(),
            Self::Prefix(prefix) => f.debug_tuple("Prefix").field(prefix).finish(),
            Self::Extension(extension) => f.debug_tuple("Extension").field(extension).finish(),
            Self::Captures(_) => f.write_str("Captures"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, url: &str) -> Option<Vec<String>> {
        UrlPattern::parse(pattern).unwrap().matches(url)
    }

    #[test]
    fn test_exact_and_sub_paths() {
        assert_eq!(matches("/led", "/led"), Some(vec![]));
        assert_eq!(matches("/led", "/led/on"), Some(vec![]));
        assert_eq!(matches("/led", "/ledger"), None);
        assert_eq!(matches("/led", "/"), None);
        assert_eq!(matches("", "/anything"), Some(vec![]));
    }

    #[test]
    fn test_prefix() {
        assert_eq!(matches("/static*", "/static"), Some(vec![]));
        assert_eq!(matches("/static*", "/static2/app.js"), Some(vec![]));
        assert_eq!(matches("/static*", "/stat"), None);
    }

    #[test]
    fn test_extension() {
        assert_eq!(matches("/*.png", "/img/logo.png"), Some(vec![]));
        assert_eq!(matches("/*.png", "/img/logo.jpg"), None);
    }

    #[test]
    fn test_captures() {
        assert_eq!(matches("/led/{id}", "/led/3"), Some(vec!["3".to_string()]));
        assert_eq!(
            matches("/sensor/{kind}/{index}", "/sensor/temp/2"),
            Some(vec!["temp".to_string(), "2".to_string()])
        );
        assert_eq!(matches("/led/{id}", "/led"), None);
        assert_eq!(matches("/led/{id}", "/led/3/extra"), None);
    }

    #[test]
    fn test_invalid_capture_pattern() {
        let error = UrlPattern::parse("/led/{a}{b}").unwrap_err();
        assert!(matches!(error, RouterError::InvalidPattern { .. }));
    }
}
