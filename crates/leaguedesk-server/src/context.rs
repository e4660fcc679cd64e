// Per-request context passed explicitly to every handler.

/// Who is asking, and on whose behalf. Built once per request from the
/// envelope and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
    pub acting_user: Option<String>,
    /// Set when an admin acts as another user.
    pub impersonating: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        RequestContext {
            request_id: request_id.into(),
            acting_user: None,
            impersonating: None,
        }
    }

    /// Blank user ids are treated as absent.
    pub fn with_acting_user(mut self, user: Option<String>) -> Self {
        self.acting_user = non_blank(user);
        self
    }

    pub fn with_impersonation(mut self, user: Option<String>) -> Self {
        self.impersonating = non_blank(user);
        self
    }

    /// The impersonated user when set, otherwise the acting user.
    pub fn effective_user(&self) -> Option<&str> {
        self.impersonating
            .as_deref()
            .or(self.acting_user.as_deref())
    }
}

fn non_blank(user: Option<String>) -> Option<String> {
    user.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())
}
