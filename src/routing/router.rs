//! Ordered action registry

use super::{Error, Pattern, Result};
use crate::http::{ContentType, Method};
use std::collections::HashMap;
use std::fmt;

/// A registered route: pattern, allowed verbs, content type and handler
pub struct Action<H> {
    pattern: Pattern,
    verbs: Vec<Method>,
    content_type: ContentType,
    handler: H,
}

impl<H> Action<H> {
    /// Compiled pattern
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Allowed verbs
    pub fn verbs(&self) -> &[Method] {
        &self.verbs
    }

    /// Whether `verb` may be used on this route
    pub fn allows(&self, verb: Method) -> bool {
        self.verbs.contains(&verb)
    }

    /// Declared content type of the route's responses
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// The handler
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Path parameters of `path`, one per placeholder
    pub fn extract_parameters(&self, path: &str) -> HashMap<String, String> {
        self.pattern.extract(path)
    }
}

impl<H> fmt::Debug for Action<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("pattern", &self.pattern.as_str())
            .field("verbs", &self.verbs)
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Route registry
///
/// Append-only while the application registers its routes, read-only once
/// it is handed to a server.
pub struct Router<H> {
    actions: Vec<Action<H>>,
}

impl<H> Router<H> {
    /// Create an empty router
    pub fn new() -> Self {
        Router { actions: Vec::new() }
    }

    /// Compile `pattern` and append an action for it
    ///
    /// Overlapping patterns are allowed; the one registered first wins.
    pub fn register(
        &mut self,
        pattern: &str,
        verbs: &[Method],
        content_type: ContentType,
        handler: H,
    ) -> Result<&mut Self> {
        if verbs.is_empty() {
            return Err(Error::EmptyVerbSet(pattern.to_string()));
        }

        let pattern = Pattern::compile(pattern)?;
        let mut allowed: Vec<Method> = Vec::with_capacity(verbs.len());
        for &verb in verbs {
            if !allowed.contains(&verb) {
                allowed.push(verb);
            }
        }

        self.actions.push(Action {
            pattern,
            verbs: allowed,
            content_type,
            handler,
        });

        Ok(self)
    }

    /// First action whose pattern matches `path`
    pub fn match_path(&self, path: &str) -> Option<&Action<H>> {
        self.actions.iter().find(|action| action.pattern.is_match(path))
    }

    /// First action matching `path`, provided it allows `verb`
    pub fn resolve(&self, path: &str, verb: Method) -> Result<&Action<H>> {
        let action = self
            .match_path(path)
            .ok_or_else(|| Error::NoMatchingRoute(path.to_string()))?;

        if !action.allows(verb) {
            return Err(Error::VerbNotAllowed {
                verb,
                path: path.to_string(),
            });
        }

        Ok(action)
    }

    /// Number of registered actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Action<H>> {
        self.actions.iter()
    }
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for Router<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.actions.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router<&'static str> {
        let mut router = Router::new();
        router
            .register("/user/admin", &[Method::Get], ContentType::TextHtml, "admin")
            .unwrap()
            .register("/user/{id}", &[Method::Get, Method::Post], ContentType::ApplicationJson, "user")
            .unwrap()
            .register("/user/{id}", &[Method::Delete], ContentType::ApplicationJson, "shadowed")
            .unwrap();
        router
    }

    #[test]
    fn test_first_registered_wins() {
        let router = router();
        assert_eq!(router.len(), 3);

        assert_eq!(*router.match_path("/user/admin").unwrap().handler(), "admin");
        assert_eq!(*router.match_path("/user/42").unwrap().handler(), "user");
    }

    #[test]
    fn test_no_match() {
        let router = router();
        assert!(router.match_path("/nope").is_none());
        assert!(matches!(
            router.resolve("/nope", Method::Get),
            Err(Error::NoMatchingRoute(path)) if path == "/nope"
        ));
    }

    #[test]
    fn test_verb_checked_on_first_match_only() {
        let router = router();
        let action = router.resolve("/user/42", Method::Post).unwrap();
        assert_eq!(*action.handler(), "user");

        // A later action allowing DELETE does not rescue the request
        assert!(matches!(
            router.resolve("/user/42", Method::Delete),
            Err(Error::VerbNotAllowed { verb: Method::Delete, .. })
        ));
    }

    #[test]
    fn test_extract_parameters() {
        let router = router();
        let action = router.match_path("/user/42").unwrap();
        let params = action.extract_parameters("/user/42");
        assert_eq!(params.len(), 1);
        assert_eq!(params["id"], "42");

        let admin = router.match_path("/user/admin").unwrap();
        assert!(admin.extract_parameters("/user/admin").is_empty());
    }

    #[test]
    fn test_duplicate_verbs_collapsed() {
        let mut router = Router::new();
        router
            .register(
                "/x",
                &[Method::Get, Method::Post, Method::Get, Method::Post],
                ContentType::TextHtml,
                "x",
            )
            .unwrap();

        let action = router.match_path("/x").unwrap();
        assert_eq!(action.verbs(), &[Method::Get, Method::Post]);
    }

    #[test]
    fn test_empty_verb_set_rejected() {
        let mut router: Router<()> = Router::new();
        let result = router.register("/x", &[], ContentType::NoneType, ());
        assert!(matches!(result, Err(Error::EmptyVerbSet(_))));
        assert!(router.is_empty());
    }

    #[test]
    fn test_invalid_pattern_not_registered() {
        let mut router: Router<()> = Router::new();
        let result = router.register("/x/{", &[Method::Get], ContentType::NoneType, ());
        assert!(matches!(result, Err(Error::InvalidPattern { .. })));
        assert!(router.is_empty());
    }
}
