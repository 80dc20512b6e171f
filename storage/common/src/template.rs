use tessera_core::StorageError;

/// Fill `{name}` placeholders in `template`. Every placeholder must have a substitution.
pub fn render(template: &str, substitutions: &[(&str, &str)]) -> Result<String, StorageError> {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(StorageError::failed(format!("unterminated placeholder in template: {}", template)));
        };
        let name = &after[..end];
        match substitutions.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => out.push_str(value),
            None => return Err(StorageError::failed(format!("no substitution for {{{}}} in template: {}", name, template))),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let sql = render("{left} = {right}", &[("left", "\"a\""), ("right", ":a")]).unwrap();
        assert_eq!(sql, "\"a\" = :a");
        // a placeholder may appear more than once
        let sql = render("{column} = excluded.{column}", &[("column", "\"v\"")]).unwrap();
        assert_eq!(sql, "\"v\" = excluded.\"v\"");
    }

    #[test]
    fn test_missing_substitution() {
        assert!(render("SELECT {columns} FROM {table}", &[("columns", "*")]).is_err());
        assert!(render("SELECT {columns", &[("columns", "*")]).is_err());
    }
}
