// Message templates and argument rendering.
//
// Templates mix literal text with `{}` placeholders (consumed in sequence)
// and `{N}` placeholders (zero-based explicit index); `{{` and `}}` escape
// literal braces. Arguments render themselves through the `Loggable` trait,
// which is also the registration point for user-defined aggregates.

use std::fmt::Write;

/// Containers stop recursing at this depth and emit `...` instead.
pub(crate) const MAX_RENDER_DEPTH: usize = 16;

/// A value that can appear as a log-message argument.
///
/// Implementations append their rendering to `out` and pass `depth + 1` to
/// nested values. Aggregates with named fields usually delegate to
/// [`render_fields`]; enums render their active alternative.
pub trait Loggable {
    fn render(&self, out: &mut String, depth: usize);
}

macro_rules! impl_loggable_display {
    ($($t:ty),*) => {
        $(
            impl Loggable for $t {
                fn render(&self, out: &mut String, _depth: usize) {
                    let _ = write!(out, "{}", self);
                }
            }
        )*
    };
}

// integers and enums in decimal, floats in shortest round-trip form,
// booleans as true/false
impl_loggable_display!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char
);

impl Loggable for str {
    fn render(&self, out: &mut String, _depth: usize) {
        out.push_str(self);
    }
}

impl Loggable for String {
    fn render(&self, out: &mut String, _depth: usize) {
        out.push_str(self);
    }
}

impl<T: Loggable + ?Sized> Loggable for &T {
    fn render(&self, out: &mut String, depth: usize) {
        (**self).render(out, depth);
    }
}

impl<T: Loggable> Loggable for Option<T> {
    fn render(&self, out: &mut String, depth: usize) {
        match self {
            None => out.push_str("null"),
            Some(inner) => inner.render(out, depth),
        }
    }
}

impl<A: Loggable, B: Loggable> Loggable for (A, B) {
    fn render(&self, out: &mut String, depth: usize) {
        if depth >= MAX_RENDER_DEPTH {
            out.push_str("...");
            return;
        }
        out.push('{');
        self.0.render(out, depth + 1);
        out.push_str(", ");
        self.1.render(out, depth + 1);
        out.push('}');
    }
}

impl<T: Loggable> Loggable for [T] {
    fn render(&self, out: &mut String, depth: usize) {
        if depth >= MAX_RENDER_DEPTH {
            out.push_str("...");
            return;
        }
        out.push('[');
        for (i, item) in self.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            item.render(out, depth + 1);
        }
        out.push(']');
    }
}

impl<T: Loggable> Loggable for Vec<T> {
    fn render(&self, out: &mut String, depth: usize) {
        self.as_slice().render(out, depth);
    }
}

impl<T: Loggable, const N: usize> Loggable for [T; N] {
    fn render(&self, out: &mut String, depth: usize) {
        self.as_slice().render(out, depth);
    }
}

/// Wrapper rendering any value as an opaque address-style token. The escape
/// hatch for types with no meaningful textual form.
pub struct Opaque<'a, T>(pub &'a T);

impl<T> Loggable for Opaque<'_, T> {
    fn render(&self, out: &mut String, _depth: usize) {
        let _ = write!(out, "0x{:x}", self.0 as *const T as usize);
    }
}

/// Render an aggregate as `{name=value, ...}`. The per-type describe hook:
/// a struct implements `Loggable` by listing its fields here.
pub fn render_fields(out: &mut String, fields: &[(&str, &dyn Loggable)], depth: usize) {
    if depth >= MAX_RENDER_DEPTH {
        out.push_str("...");
        return;
    }
    out.push('{');
    for (i, (name, value)) in fields.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(name);
        out.push('=');
        value.render(out, depth + 1);
    }
    out.push('}');
}

/// Expand `template` into `out`, substituting placeholders from `args`.
/// A placeholder with no matching argument is emitted verbatim.
pub(crate) fn format_template(out: &mut String, template: &str, args: &[&dyn Loggable]) {
    let bytes = template.as_bytes();
    let mut literal_start = 0;
    let mut pos = 0;
    let mut next_implicit = 0;

    while pos < bytes.len() {
        if bytes[pos] == b'}' {
            if bytes.get(pos + 1) == Some(&b'}') {
                out.push_str(&template[literal_start..pos]);
                out.push('}');
                pos += 2;
                literal_start = pos;
            } else {
                pos += 1;
            }
            continue;
        }
        if bytes[pos] != b'{' {
            pos += 1;
            continue;
        }

        // flush the literal run before this brace
        out.push_str(&template[literal_start..pos]);

        if bytes.get(pos + 1) == Some(&b'{') {
            out.push('{');
            pos += 2;
            literal_start = pos;
            continue;
        }

        if bytes.get(pos + 1) == Some(&b'}') {
            let index = next_implicit;
            next_implicit += 1;
            match args.get(index) {
                Some(arg) => arg.render(out, 0),
                None => out.push_str("{}"),
            }
            pos += 2;
            literal_start = pos;
            continue;
        }

        // explicit index: one or more digits then a closing brace
        let digits_end = pos + 1 + count_digits(&bytes[pos + 1..]);
        if digits_end > pos + 1 && bytes.get(digits_end) == Some(&b'}') {
            // digits are ASCII, cannot fail to parse short of overflow
            match template[pos + 1..digits_end].parse::<usize>().ok() {
                Some(index) if index < args.len() => args[index].render(out, 0),
                _ => out.push_str(&template[pos..=digits_end]),
            }
            pos = digits_end + 1;
            literal_start = pos;
            continue;
        }

        // lone brace: keep it as literal text
        out.push('{');
        pos += 1;
        literal_start = pos;
    }

    out.push_str(&template[literal_start..]);
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fmt(template: &str, args: &[&dyn Loggable]) -> String {
        let mut out = String::new();
        format_template(&mut out, template, args);
        out
    }

    #[test]
    fn test_implicit_placeholders() {
        assert_eq!(fmt("hello {}", &[&"world"]), "hello world");
        assert_eq!(fmt("{} + {} = {}", &[&1, &2, &3]), "1 + 2 = 3");
    }

    #[test]
    fn test_explicit_indices() {
        assert_eq!(fmt("{1} {0}", &[&"b", &"a"]), "a b");
        assert_eq!(fmt("{0}{0}", &[&"x"]), "xx");
    }

    #[test]
    fn test_brace_escape() {
        assert_eq!(fmt("x={{}}", &[&1]), "x={}");
        assert_eq!(fmt("{{}}", &[]), "{}");
        assert_eq!(fmt("a}}b", &[]), "a}b");
    }

    #[test]
    fn test_missing_argument_kept_verbatim() {
        assert_eq!(fmt("a {} b {}", &[&1]), "a 1 b {}");
        assert_eq!(fmt("{5}", &[&1]), "{5}");
    }

    #[test]
    fn test_lone_and_trailing_braces() {
        assert_eq!(fmt("a{b", &[]), "a{b");
        assert_eq!(fmt("a}b", &[]), "a}b");
        assert_eq!(fmt("tail{", &[]), "tail{");
        assert_eq!(fmt("tail}", &[]), "tail}");
        assert_eq!(fmt("{x}", &[&1]), "{x}");
    }

    #[test]
    fn test_scalar_renderings() {
        assert_eq!(fmt("{}", &[&true]), "true");
        assert_eq!(fmt("{}", &[&false]), "false");
        assert_eq!(fmt("{}", &[&-104i32]), "-104");
        assert_eq!(fmt("{}", &[&512u64]), "512");
        assert_eq!(fmt("{}", &[&17.4f64]), "17.4");
        assert_eq!(fmt("{}", &[&512.0f64]), "512");
    }

    #[test]
    fn test_option_renderings() {
        let absent: Option<i32> = None;
        let present = Some(42);
        assert_eq!(fmt("{} {}", &[&absent, &present]), "null 42");
    }

    #[test]
    fn test_pair_and_sequence() {
        let pair = (1, "two");
        assert_eq!(fmt("{}", &[&pair]), "{1, two}");

        let seq = vec!["admin", "developer", "operator"];
        assert_eq!(fmt("{}", &[&seq]), "[admin, developer, operator]");

        let fixed = [1, 2, 3];
        assert_eq!(fmt("{}", &[&fixed]), "[1, 2, 3]");

        let empty: Vec<i32> = vec![];
        assert_eq!(fmt("{}", &[&empty]), "[]");
    }

    #[test]
    fn test_opaque_token() {
        let value = 7u64;
        let rendered = fmt("{}", &[&Opaque(&value)]);
        assert!(rendered.starts_with("0x"));
        assert!(rendered.len() > 2);
    }

    struct Address {
        street: String,
        building: String,
    }

    impl Loggable for Address {
        fn render(&self, out: &mut String, depth: usize) {
            render_fields(
                out,
                &[("street", &self.street), ("building", &self.building)],
                depth,
            );
        }
    }

    struct User {
        name: String,
        patronymic: Option<String>,
        address: Address,
        roles: Vec<String>,
    }

    impl Loggable for User {
        fn render(&self, out: &mut String, depth: usize) {
            render_fields(
                out,
                &[
                    ("name", &self.name),
                    ("patronymic", &self.patronymic),
                    ("address", &self.address),
                    ("roles", &self.roles),
                ],
                depth,
            );
        }
    }

    #[test]
    fn test_nested_aggregate() {
        let user = User {
            name: "Anna".to_string(),
            patronymic: None,
            address: Address {
                street: "Nevsky Prospekt".to_string(),
                building: "24".to_string(),
            },
            roles: vec!["user".to_string(), "viewer".to_string()],
        };
        assert_eq!(
            fmt("user: {}", &[&user]),
            "user: {name=Anna, patronymic=null, \
             address={street=Nevsky Prospekt, building=24}, roles=[user, viewer]}"
        );
    }

    enum Sex {
        Male(bool),
        Female(bool),
    }

    impl Loggable for Sex {
        fn render(&self, out: &mut String, depth: usize) {
            match self {
                Sex::Male(flag) => render_fields(out, &[("male", flag)], depth),
                Sex::Female(flag) => render_fields(out, &[("female", flag)], depth),
            }
        }
    }

    #[test]
    fn test_variant_renders_active_alternative() {
        assert_eq!(fmt("{}", &[&Sex::Male(true)]), "{male=true}");
        assert_eq!(fmt("{}", &[&Sex::Female(true)]), "{female=true}");
    }

    struct Cyclic(u32);

    impl Loggable for Cyclic {
        fn render(&self, out: &mut String, depth: usize) {
            render_fields(out, &[("next", &Cyclic(self.0 + 1))], depth)
        }
    }

    #[test]
    fn test_depth_cap_emits_ellipsis() {
        let rendered = fmt("{}", &[&Cyclic(0)]);
        let expected_tail = format!("...{}", "}".repeat(MAX_RENDER_DEPTH));
        assert!(rendered.ends_with(&expected_tail), "got: {:?}", rendered);
        assert_eq!(rendered.matches("next=").count(), MAX_RENDER_DEPTH);
    }

    proptest! {
        #[test]
        fn prop_never_panics_on_arbitrary_templates(template in ".*", a in any::<i64>()) {
            let mut out = String::new();
            format_template(&mut out, &template, &[&a]);
        }

        #[test]
        fn prop_no_placeholder_passthrough(template in "[^{}]*") {
            let mut out = String::new();
            format_template(&mut out, &template, &[]);
            prop_assert_eq!(out, template);
        }
    }
}
