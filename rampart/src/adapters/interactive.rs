//! Rendering for browser form posts: a redirect back to the form with a flash message.

use crate::{adapters::AuthOutcome, messages};

pub const CUSTOMER_LOGIN_PATH: &str = "customer/account/login";
pub const CUSTOMER_FORGOT_PASSWORD_PATH: &str = "customer/account/forgotpassword";
pub const ADMIN_LOGIN_PATH: &str = "admin";
pub const ADMIN_FORGOT_PASSWORD_PATH: &str = "admin/auth/forgotpassword";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractiveResponse<T> {
    /// The host's own result, passed through.
    Completed(T),
    Redirect { location: String, flash: String },
}

impl<T> InteractiveResponse<T> {
    /// Render an outcome, sending failures back to `location`.
    pub fn render(outcome: AuthOutcome<T>, location: &str) -> Self {
        match messages::for_outcome(&outcome) {
            None => match outcome {
                AuthOutcome::Success(value) => InteractiveResponse::Completed(value),
                _ => InteractiveResponse::Redirect {
                    location: location.to_string(),
                    flash: messages::INVALID_CREDENTIALS.to_string(),
                },
            },
            Some(flash) => InteractiveResponse::Redirect {
                location: location.to_string(),
                flash,
            },
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, InteractiveResponse::Redirect { .. })
    }

    pub fn flash(&self) -> Option<&str> {
        match self {
            InteractiveResponse::Completed(_) => None,
            InteractiveResponse::Redirect { flash, .. } => Some(flash),
        }
    }
}
