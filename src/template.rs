//! Recipient placeholder substitution.

/// The only placeholder recognised in message bodies.
pub const NAME_PLACEHOLDER: &str = "{name}";

/// Replace every literal `{name}` in `body` with `name`.
///
/// No escaping and no recursive substitution: a `{name}` inside `name` is
/// inserted as-is.
///
/// ```
/// assert_eq!(bulkmail::render("Hi {name}, bye {name}", "Sam"), "Hi Sam, bye Sam");
/// assert_eq!(bulkmail::render("no placeholder", "Sam"), "no placeholder");
/// ```
pub fn render(body: &str, name: &str) -> String {
    body.replace(NAME_PLACEHOLDER, name)
}
