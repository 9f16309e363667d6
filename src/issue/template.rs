//! Rendering of the per-application OpenSSL config.

/// Built-in OpenSSL config template. Placeholders: `{{appName}}`,
/// `{{commonName}}`, `{{altNames}}`.
pub const APP_CNF_TEMPLATE: &str = include_str!("../../templates/app.cnf");

/// Extension section of the rendered config applied when signing.
pub const SIGNING_EXTENSIONS: &str = "v3_ext";

/// `DNS.<n> = <name>` lines, 1-indexed, in request order.
pub fn alt_names_block(alt_names: &[String]) -> String {
    alt_names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("DNS.{} = {}", i + 1, name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Substitute the request fields into `template`.
pub fn render(template: &str, app_name: &str, common_name: &str, alt_names: &[String]) -> String {
    template
        .replace("{{appName}}", app_name)
        .replace("{{commonName}}", common_name)
        .replace("{{altNames}}", &alt_names_block(alt_names))
}
