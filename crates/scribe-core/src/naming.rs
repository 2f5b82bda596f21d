//! Short, dotted type names derived from fully-qualified class names.

const NOISE_SEGMENTS: [&str; 3] = ["entity", "entities", "model"];
const BUNDLE_SUFFIX: &str = "Bundle";

fn split_segments(class: &str) -> Vec<&str> {
    class
        .split(['\\', '.'])
        .flat_map(|part| part.split("::"))
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Normalize a class name into the `typ` stored with every reference.
///
/// Everything up to and including the last `Entity`/`Entities`/`Model`
/// segment is dropped, except the name of a directly preceding `XxxBundle`
/// segment which is kept without its suffix. Each remaining segment is
/// converted to lower snake case and the segments are joined with dots.
///
/// ```
/// use scribe_core::naming::type_name;
///
/// assert_eq!(type_name("App\\Entity\\OrderItem"), "order_item");
/// assert_eq!(type_name("AppBundle\\Entity\\Blog\\PostTag"), "app.blog.post_tag");
/// assert_eq!(type_name("shop::model::LineItem"), "line_item");
/// ```
#[must_use]
pub fn type_name(class: &str) -> String {
    let segments = split_segments(class);
    let noise = segments
        .iter()
        .rposition(|s| NOISE_SEGMENTS.contains(&s.to_ascii_lowercase().as_str()));

    let kept: Vec<&str> = match noise {
        Some(pos) if pos + 1 < segments.len() => {
            let bundle = pos
                .checked_sub(1)
                .map(|prev| segments[prev])
                .and_then(|prev| prev.strip_suffix(BUNDLE_SUFFIX))
                .filter(|name| !name.is_empty());
            bundle
                .into_iter()
                .chain(segments[pos + 1..].iter().copied())
                .collect()
        }
        _ => segments,
    };

    kept.iter()
        .map(|segment| snake_case(segment))
        .collect::<Vec<_>>()
        .join(".")
}

/// Insert an underscore before every uppercase letter that follows a letter,
/// then lowercase.
fn snake_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() + 4);
    let mut prev: Option<char> = None;
    for c in segment.chars() {
        if c.is_uppercase() && prev.is_some_and(char::is_alphabetic) {
            out.push('_');
        }
        out.extend(c.to_lowercase());
        prev = Some(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("App\\Entity\\OrderItem", "order_item")]
    #[case("App.Entity.OrderItem", "order_item")]
    #[case("AppBundle\\Entity\\Blog\\PostTag", "app.blog.post_tag")]
    #[case("Acme\\ShopBundle\\Entity\\Product", "shop.product")]
    #[case("shop::entities::LineItem", "line_item")]
    #[case("Billing\\Invoice\\InvoiceLine", "billing.invoice.invoice_line")]
    #[case("User", "user")]
    #[case("App\\Entity", "app.entity")]
    #[case("Geo\\Entity\\Point3D", "point3d")]
    fn type_names(#[case] class: &str, #[case] expected: &str) {
        assert_eq!(type_name(class), expected);
    }
}
