mod account;
mod health_check;

pub use account::{get_current_user, login, refresh_token};
pub use health_check::health_check;
