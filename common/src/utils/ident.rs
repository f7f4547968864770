//! SQL identifier quoting.
//!
//! Every table or column name that reaches a statement goes through
//! `quote_ident`; values never do (they are bound as parameters or
//! escaped by the active handle).

/// Quotes an identifier with backticks, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_name_is_wrapped() {
        assert_eq!(quote_ident("users"), "`users`");
    }

    #[test]
    fn embedded_backticks_are_doubled() {
        assert_eq!(quote_ident("weird`name"), "`weird``name`");
    }
}
