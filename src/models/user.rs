use serde::Serialize;
use std::net::IpAddr;

/// Identity a request acts on behalf of. Anonymous users carry no token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct User {
    pub access_token: Option<String>,
    pub ip: Option<IpAddr>,
}

impl User {
    pub fn anonymous() -> Self {
        Self::default()
    }
    pub fn or_anonymous(user: Option<User>) -> Self {
        user.unwrap_or_else(User::anonymous)
    }
    pub fn is_logged_in(&self) -> bool {
        self.access_token.is_some()
    }
    /// What templates get to see of the user; the token never reaches HTML.
    pub fn view(&self) -> UserView {
        UserView {
            logged_in: self.is_logged_in(),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct UserView {
    pub logged_in: bool,
}
