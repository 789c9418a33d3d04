//! Tokenizes symbol names across case conventions and generates variants
//! for cross-language matching (e.g. TypeScript `UserService` vs. SQL
//! `users` vs. Rust `user_service`).

use std::collections::HashMap;

const PLURAL_EXCEPTIONS: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("tooth", "teeth"),
    ("foot", "feet"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("man", "men"),
    ("woman", "women"),
];

const ALREADY_PLURAL_IRREGULARS: &[&str] =
    &["children", "people", "men", "women", "teeth", "feet", "mice", "geese"];

const COMMON_SUFFIXES: &[&str] = &[
    "Controller", "Service", "Manager", "Handler", "Repository", "Repo", "Factory", "Builder",
    "Model", "Entity", "Dto", "DTO",
];

/// Split a symbol name into words, recognizing snake_case, kebab-case,
/// camelCase, PascalCase, SCREAMING_SNAKE, acronym runs, and embedded digits.
///
/// Digits attach to the word they follow (`OAuth2Client` → `["OAuth2",
/// "Client"]`); an acronym run followed by a lowercase letter splits its
/// last uppercase letter into the next word (`HTTPServer` → `["HTTP",
/// "Server"]`).
pub fn parse_symbol_words(symbol_name: &str) -> Vec<String> {
    if symbol_name.is_empty() {
        return Vec::new();
    }

    if symbol_name.contains('_') || symbol_name.contains('-') {
        return symbol_name
            .split(['_', '-'])
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
    }

    let chars: Vec<char> = symbol_name.chars().collect();
    let mut result = Vec::new();
    let mut current = String::new();

    for i in 0..chars.len() {
        let c = chars[i];
        if i == 0 {
            current.push(c);
        } else if c.is_ascii_digit() {
            if chars[i - 1].is_ascii_digit() {
                current.push(c);
            } else {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                }
                current.push(c);
            }
        } else if c.is_uppercase() {
            if !current.is_empty() {
                let prev = chars[i - 1];
                if prev.is_ascii_digit() || prev.is_lowercase() {
                    result.push(std::mem::take(&mut current));
                    current.push(c);
                } else if chars.get(i + 1).is_some_and(|n| n.is_lowercase()) {
                    // Look ahead: a digit before the next uppercase run means
                    // this acronym+lowercase+digit should stay one word
                    // (OAuth2 stays together instead of splitting at "O").
                    let mut digit_ahead = false;
                    for &future in &chars[i + 1..] {
                        if future.is_ascii_digit() {
                            digit_ahead = true;
                            break;
                        } else if future.is_uppercase() {
                            break;
                        }
                    }
                    if digit_ahead && current.chars().count() == 1 && current.chars().all(|c| c.is_uppercase()) {
                        current.push(c);
                    } else {
                        result.push(std::mem::take(&mut current));
                        current.push(c);
                    }
                } else {
                    current.push(c);
                }
            } else {
                current.push(c);
            }
        } else if !current.is_empty() && chars[i - 1].is_ascii_digit() {
            result.push(std::mem::take(&mut current));
            current.push(c);
        } else {
            current.push(c);
        }
    }

    if !current.is_empty() {
        result.push(current);
    }

    result
}

/// English pluralization with an irregular-word table.
///
/// Already-plural input is detected and returned unchanged rather than
/// double-pluralized.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return word.to_string();
    }
    let lower = word.to_lowercase();

    if let Some((_, plural)) = PLURAL_EXCEPTIONS.iter().find(|(s, _)| *s == lower) {
        return preserve_case(word, plural);
    }
    if ALREADY_PLURAL_IRREGULARS.contains(&lower.as_str()) {
        return word.to_string();
    }
    if lower.ends_with('s') && !(lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is")) {
        return word.to_string();
    }
    if lower.ends_with("ss")
        || lower.ends_with("sh")
        || lower.ends_with("ch")
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("us")
        || lower.ends_with("is")
    {
        return format!("{word}es");
    }
    if word.chars().count() >= 2 && lower.ends_with('y') {
        let second_last = lower.chars().rev().nth(1).unwrap();
        if !"aeiou".contains(second_last) {
            let mut stem: String = word.chars().collect();
            stem.truncate(stem.chars().count() - 1);
            return format!("{stem}ies");
        }
    }
    format!("{word}s")
}

/// English singularization, inverse of [`pluralize`], with false-plural
/// guards (`status`, `basis`, `crisis` are not treated as plurals).
pub fn singularize(word: &str) -> String {
    if word.is_empty() {
        return word.to_string();
    }
    let lower = word.to_lowercase();

    if let Some((singular, _)) = PLURAL_EXCEPTIONS.iter().find(|(_, p)| *p == lower) {
        return preserve_case(word, singular);
    }
    if lower.ends_with("ies") && word.chars().count() > 3 {
        let mut stem = truncate_chars(word, 3);
        stem.push('y');
        return stem;
    }
    if lower.ends_with("us") || lower.ends_with("is") || lower.ends_with("ss") {
        return word.to_string();
    }
    if lower.ends_with("es") && word.chars().count() > 2 {
        let stem = truncate_chars(word, 2);
        let stem_lower = stem.to_lowercase();
        if stem_lower.ends_with('s')
            || stem_lower.ends_with("sh")
            || stem_lower.ends_with("ch")
            || stem_lower.ends_with('x')
            || stem_lower.ends_with('z')
            || stem_lower.ends_with("us")
            || stem_lower.ends_with("is")
        {
            return stem;
        }
        return truncate_chars(word, 1);
    }
    if lower.ends_with('s') && word.chars().count() > 1 {
        return truncate_chars(word, 1);
    }
    word.to_string()
}

fn truncate_chars(s: &str, drop_from_end: usize) -> String {
    let keep = s.chars().count().saturating_sub(drop_from_end);
    s.chars().take(keep).collect()
}

fn preserve_case(original: &str, replacement: &str) -> String {
    if original.chars().next().is_some_and(|c| c.is_uppercase()) {
        let mut chars = replacement.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    } else {
        replacement.to_string()
    }
}

/// All prefix-stripped variants of `symbol_name`, starting with the
/// original. Recognizes single-letter interface/type prefixes (`I`, `T`,
/// `E`, `A`, when followed by an uppercase letter) and the `Base` prefix,
/// recursively (`IBaseUser` → `["IBaseUser", "BaseUser", "User"]`).
pub fn strip_common_prefixes(symbol_name: &str) -> Vec<String> {
    let mut results = vec![symbol_name.to_string()];
    let chars: Vec<char> = symbol_name.chars().collect();

    if chars.len() > 2 && "ITEA".contains(chars[0]) && chars[1].is_uppercase() {
        let without: String = chars[1..].iter().collect();
        push_unique(&mut results, without.clone());
        for variant in strip_common_prefixes(&without) {
            push_unique(&mut results, variant);
        }
    }

    if symbol_name.starts_with("Base") && chars.len() > 4 && chars[4].is_uppercase() {
        let without: String = chars[4..].iter().collect();
        push_unique(&mut results, without.clone());
        for variant in strip_common_prefixes(&without) {
            push_unique(&mut results, variant);
        }
    }

    results
}

/// All suffix-stripped variants of `symbol_name`, starting with the
/// original. Strips one suffix per recursive step, never leaving an empty
/// stem, and never stripping a suffix that equals the whole name.
pub fn strip_common_suffixes(symbol_name: &str) -> Vec<String> {
    let mut results = vec![symbol_name.to_string()];

    for suffix in COMMON_SUFFIXES {
        if symbol_name.ends_with(suffix) && symbol_name.len() > suffix.len() {
            let without = &symbol_name[..symbol_name.len() - suffix.len()];
            if !without.is_empty() {
                push_unique(&mut results, without.to_string());
                for variant in strip_common_suffixes(without) {
                    push_unique(&mut results, variant);
                }
            }
            break;
        }
    }

    results
}

fn push_unique(results: &mut Vec<String>, candidate: String) {
    if !results.contains(&candidate) {
        results.push(candidate);
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
        }
        None => String::new(),
    }
}

/// Generate every naming-convention variant for `symbol_name`, keyed by
/// style name (`snake_case`, `camel_case`, `pascal_case`, `kebab_case`,
/// `screaming_snake`, `screaming_kebab`, `plural_snake`, `plural_pascal`,
/// `singular_snake`, `singular_pascal`, and `without_prefix_*`/
/// `without_suffix_*` when an affix is detected). Always contains
/// `original`.
pub fn generate_variants(symbol_name: &str) -> HashMap<String, String> {
    let mut result = HashMap::new();
    result.insert("original".to_string(), symbol_name.to_string());

    let words = parse_symbol_words(symbol_name);
    if words.is_empty() {
        return result;
    }

    // snake_case: mixed-case words (OAuth) split further; digits attach
    // to the previous word without a separator.
    let mut snake_parts: Vec<String> = Vec::new();
    for w in &words {
        if w.chars().all(|c| c.is_ascii_digit()) && !snake_parts.is_empty() {
            let last = snake_parts.last_mut().unwrap();
            last.push_str(w);
        } else if w.chars().count() > 1
            && w.chars().any(|c| c.is_uppercase())
            && w.chars().any(|c| c.is_lowercase())
        {
            for sub in parse_symbol_words(w) {
                if sub.chars().all(|c| c.is_ascii_digit()) && !snake_parts.is_empty() {
                    let last = snake_parts.last_mut().unwrap();
                    last.push_str(&sub);
                } else {
                    snake_parts.push(sub.to_lowercase());
                }
            }
        } else {
            snake_parts.push(w.to_lowercase());
        }
    }
    result.insert("snake_case".to_string(), snake_parts.join("_"));

    // camel_case: first word lowercase, rest capitalized; ALL CAPS words
    // lowercase entirely, mixed-case words lowercase only the first letter.
    let camel = if words.len() == 1 {
        lower_first_word(&words[0])
    } else {
        let mut parts = vec![lower_first_word(&words[0])];
        for w in &words[1..] {
            if w.chars().all(|c| c.is_ascii_digit()) {
                let last = parts.last_mut().unwrap();
                last.push_str(w);
            } else {
                parts.push(capitalize(w));
            }
        }
        parts.join("")
    };
    result.insert("camel_case".to_string(), camel);

    // pascal_case: all words capitalized; mixed-case words preserved as-is.
    let mut pascal_parts: Vec<String> = Vec::new();
    for w in &words {
        if w.chars().all(|c| c.is_ascii_digit()) && !pascal_parts.is_empty() {
            let last = pascal_parts.last_mut().unwrap();
            last.push_str(w);
        } else if w.chars().all(|c| c.is_uppercase()) {
            pascal_parts.push(capitalize(w));
        } else if w.chars().count() > 1
            && w.chars().next().is_some_and(|c| c.is_uppercase())
            && w.chars().skip(1).any(|c| c.is_lowercase())
        {
            pascal_parts.push(w.clone());
        } else {
            pascal_parts.push(capitalize(w));
        }
    }
    result.insert("pascal_case".to_string(), pascal_parts.join(""));

    result.insert(
        "kebab_case".to_string(),
        words.iter().map(|w| w.to_lowercase()).collect::<Vec<_>>().join("-"),
    );
    result.insert(
        "screaming_snake".to_string(),
        words.iter().map(|w| w.to_uppercase()).collect::<Vec<_>>().join("_"),
    );
    result.insert(
        "screaming_kebab".to_string(),
        words.iter().map(|w| w.to_uppercase()).collect::<Vec<_>>().join("-"),
    );

    if let Some(last_word) = words.last() {
        let plural_last = pluralize(last_word);
        if &plural_last != last_word {
            let mut plural_words = words.clone();
            *plural_words.last_mut().unwrap() = plural_last;
            result.insert(
                "plural_snake".to_string(),
                plural_words.iter().map(|w| w.to_lowercase()).collect::<Vec<_>>().join("_"),
            );
            result.insert(
                "plural_pascal".to_string(),
                plural_words.iter().map(|w| capitalize(w)).collect::<Vec<_>>().join(""),
            );
        }

        let singular_last = singularize(last_word);
        if &singular_last != last_word {
            let mut singular_words = words.clone();
            *singular_words.last_mut().unwrap() = singular_last;
            result.insert(
                "singular_snake".to_string(),
                singular_words.iter().map(|w| w.to_lowercase()).collect::<Vec<_>>().join("_"),
            );
            result.insert(
                "singular_pascal".to_string(),
                singular_words.iter().map(|w| capitalize(w)).collect::<Vec<_>>().join(""),
            );
        }
    }

    let prefix_variants = strip_common_prefixes(symbol_name);
    if let Some(variant) = prefix_variants.get(1) {
        let variant_words = parse_symbol_words(variant);
        result.insert(
            "without_prefix_snake".to_string(),
            variant_words.iter().map(|w| w.to_lowercase()).collect::<Vec<_>>().join("_"),
        );
        result.insert(
            "without_prefix_pascal".to_string(),
            variant_words.iter().map(|w| capitalize(w)).collect::<Vec<_>>().join(""),
        );
    }

    let suffix_variants = strip_common_suffixes(symbol_name);
    if let Some(variant) = suffix_variants.get(1) {
        let variant_words = parse_symbol_words(variant);
        result.insert(
            "without_suffix_snake".to_string(),
            variant_words.iter().map(|w| w.to_lowercase()).collect::<Vec<_>>().join("_"),
        );
        result.insert(
            "without_suffix_pascal".to_string(),
            variant_words.iter().map(|w| capitalize(w)).collect::<Vec<_>>().join(""),
        );
    }

    result
}

fn lower_first_word(word: &str) -> String {
    if word.chars().all(|c| c.is_uppercase()) {
        word.to_lowercase()
    } else {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_pascal_case() {
        assert_eq!(parse_symbol_words("UserService"), vec!["User", "Service"]);
    }

    #[test]
    fn tokenizes_snake_case() {
        assert_eq!(parse_symbol_words("user_service"), vec!["user", "service"]);
    }

    #[test]
    fn tokenizes_acronym_followed_by_word() {
        assert_eq!(parse_symbol_words("HTTPServer"), vec!["HTTP", "Server"]);
    }

    #[test]
    fn tokenizes_digit_attached_to_acronym() {
        assert_eq!(parse_symbol_words("OAuth2Client"), vec!["OAuth2", "Client"]);
    }

    #[test]
    fn tokenizes_empty_string() {
        assert_eq!(parse_symbol_words(""), Vec::<String>::new());
    }

    #[test]
    fn pluralize_regular_word() {
        assert_eq!(pluralize("user"), "users");
    }

    #[test]
    fn pluralize_irregular_word() {
        assert_eq!(pluralize("child"), "children");
        assert_eq!(pluralize("Person"), "People");
    }

    #[test]
    fn pluralize_false_singular_guard() {
        assert_eq!(pluralize("status"), "statuses");
    }

    #[test]
    fn pluralize_consonant_y() {
        assert_eq!(pluralize("category"), "categories");
    }

    #[test]
    fn pluralize_already_plural_is_unchanged() {
        assert_eq!(pluralize("users"), "users");
    }

    #[test]
    fn singularize_regular_word() {
        assert_eq!(singularize("users"), "user");
    }

    #[test]
    fn singularize_irregular_word() {
        assert_eq!(singularize("children"), "child");
    }

    #[test]
    fn singularize_false_plural_guard() {
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("basis"), "basis");
    }

    #[test]
    fn singularize_ies_ending() {
        assert_eq!(singularize("categories"), "category");
    }

    #[test]
    fn strips_interface_prefix() {
        assert_eq!(strip_common_prefixes("IUser"), vec!["IUser", "User"]);
    }

    #[test]
    fn strips_nested_prefixes() {
        assert_eq!(
            strip_common_prefixes("IBaseUser"),
            vec!["IBaseUser", "BaseUser", "User"]
        );
    }

    #[test]
    fn no_prefix_returns_original_only() {
        assert_eq!(strip_common_prefixes("User"), vec!["User"]);
    }

    #[test]
    fn strips_suffix() {
        assert_eq!(strip_common_suffixes("UserDto"), vec!["UserDto", "User"]);
    }

    #[test]
    fn strips_nested_suffixes() {
        assert_eq!(
            strip_common_suffixes("UserServiceManager"),
            vec!["UserServiceManager", "UserService", "User"]
        );
    }

    #[test]
    fn whole_name_equal_to_suffix_is_not_stripped() {
        assert_eq!(strip_common_suffixes("Service"), vec!["Service"]);
    }

    #[test]
    fn generates_core_variants_for_pascal_name() {
        let variants = generate_variants("UserService");
        assert_eq!(variants["snake_case"], "user_service");
        assert_eq!(variants["camel_case"], "userService");
        assert_eq!(variants["pascal_case"], "UserService");
        assert_eq!(variants["kebab_case"], "user-service");
        assert_eq!(variants["screaming_snake"], "USER_SERVICE");
        assert_eq!(variants["plural_snake"], "user_services");
    }

    #[test]
    fn generates_prefix_variants_for_interface_name() {
        let variants = generate_variants("IUser");
        assert_eq!(variants["without_prefix_snake"], "user");
        assert_eq!(variants["without_prefix_pascal"], "User");
    }

    #[test]
    fn generates_suffix_variants_for_dto_name() {
        let variants = generate_variants("UserDto");
        assert_eq!(variants["without_suffix_snake"], "user");
        assert_eq!(variants["without_suffix_pascal"], "User");
    }

    #[test]
    fn generates_singular_variant_for_plural_table_name() {
        let variants = generate_variants("users");
        assert_eq!(variants["singular_snake"], "user");
        assert_eq!(variants["singular_pascal"], "User");
    }

    #[test]
    fn empty_input_has_only_original() {
        let variants = generate_variants("");
        assert_eq!(variants.len(), 1);
        assert_eq!(variants["original"], "");
    }
}
