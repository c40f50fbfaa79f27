//! Name mapping between engine (snake_case) and host (PascalCase) names

/// Engine names whose host method does not follow the PascalCase rule
const EXCEPTIONS: &[(&str, &str)] = &[("seek", "SeekTo"), ("type_string", "TypeToString")];

/// Host method name for an engine virtual: `_process` -> `Process`
pub fn host_method_name(engine_name: &str) -> String {
    let bare = engine_name.trim_start_matches('_');
    EXCEPTIONS
        .iter()
        .find(|(engine, _)| *engine == bare)
        .map(|(_, host)| (*host).to_string())
        .unwrap_or_else(|| pascal_case(bare))
}

/// `get_plugin_name` -> `GetPluginName`
pub fn pascal_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    for word in snake.split('_').filter(|w| !w.is_empty()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// `SeekTo` -> `seek_to`, `HTTPRequest` -> `http_request`
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                None | Some('_') => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) => p.is_uppercase() && next.is_some_and(char::is_lowercase),
            };
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Last path segment of a Rust type name, generic arguments stripped
pub fn type_short_name(full: &str) -> &str {
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head)
}

/// Engine class names are identifiers: a letter or `_`, then alphanumerics
pub fn is_valid_class_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Extra functions with these names designate the class constructor:
/// `new`, `new_*`, `New`, `New*` (next char uppercase)
pub fn is_constructor_name(name: &str) -> bool {
    if name == "new" || name.starts_with("new_") {
        return true;
    }
    match name.strip_prefix("New") {
        Some(rest) => rest.chars().next().map_or(true, char::is_uppercase),
        None => false,
    }
}
