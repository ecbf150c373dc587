//! Fingerprint masking: launch flags and an init script that runs before
//! any page script.

/// Extra Chromium flags on top of the backend's defaults.
pub fn launch_args(user_agent: &str) -> Vec<String> {
    vec![
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-extensions".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--mute-audio".to_string(),
        "--lang=en-US".to_string(),
        format!("--user-agent={user_agent}"),
    ]
}

/// Script evaluated on every new document.
///
/// Hides `navigator.webdriver` and fills the properties headless Chromium
/// leaves empty. Must stay idempotent: it runs again on every navigation.
pub fn init_script() -> &'static str {
    r#"(() => {
        try {
            Object.defineProperty(Navigator.prototype, 'webdriver', { get: () => undefined });
        } catch (_) {}
        try {
            if (!navigator.languages || navigator.languages.length === 0) {
                Object.defineProperty(Navigator.prototype, 'languages', { get: () => ['en-US', 'en'] });
            }
        } catch (_) {}
        try {
            if (navigator.plugins && navigator.plugins.length === 0) {
                Object.defineProperty(Navigator.prototype, 'plugins', { get: () => [1, 2, 3] });
            }
        } catch (_) {}
        if (!window.chrome) {
            window.chrome = { runtime: {} };
        }
        const query = window.navigator.permissions && window.navigator.permissions.query;
        if (query) {
            window.navigator.permissions.query = (p) =>
                p && p.name === 'notifications'
                    ? Promise.resolve({ state: Notification.permission })
                    : query.call(window.navigator.permissions, p);
        }
    })();"#
}
