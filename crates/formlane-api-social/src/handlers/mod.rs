//! HTTP handlers for the authentication flows.

pub mod authorize;
pub mod callback;
pub mod link;
pub mod widget;

pub use authorize::{available_providers, start_redirect};
pub use callback::callback;
pub use link::{list_links, unlink};
pub use widget::widget_callback;
