//! Crate version information.

/// Current crate version.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the User-Agent string for outgoing requests.
pub fn build_user_agent(suffix: Option<&str>) -> String {
    let mut ua = format!(
        "kawaii-rust/{} ({}; {})",
        SDK_VERSION,
        std::env::consts::OS,
        std::env::consts::ARCH
    );

    if let Some(s) = suffix {
        ua.push(' ');
        ua.push_str(s);
    }

    ua
}
