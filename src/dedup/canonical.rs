/// Query parameters that only carry tracking data and never change which
/// article a link points to.
const TRACKING_PARAMS: &[&str] = &[
    "_ga",
    "_hsenc",
    "_hsmi",
    "dclid",
    "fbclid",
    "gclid",
    "gclsrc",
    "igshid",
    "li_fat_id",
    "mc_cid",
    "mc_eid",
    "mkt_tok",
    "msclkid",
    "ttclid",
    "twclid",
    "yclid",
];

/// Prefix shared by the Google Analytics campaign parameters (`utm_source`, ...).
const TRACKING_PREFIX: &str = "utm_";

/// Reduces an article link to the key used for URL duplicate checks.
///
/// Drops the fragment and every tracking query parameter, then removes any
/// `?` or `&` left dangling. Surviving parameters keep their order and their
/// exact encoding, so two links that differ only in tracking noise produce the
/// same key.
///
/// This is a plain string transform: malformed links are returned with as much
/// cleanup as applies, and the result is stable under repeated application.
///
/// # Examples
///
/// ```
/// use newsdedup::dedup::canonicalize;
///
/// assert_eq!(
///     canonicalize("https://x/a?utm_source=y&id=1#frag"),
///     "https://x/a?id=1"
/// );
/// assert_eq!(canonicalize(""), "");
/// ```
pub fn canonicalize(url: &str) -> String {
    let without_fragment = match url.find('#') {
        Some(idx) => &url[..idx],
        None => url,
    };

    let Some((base, query)) = without_fragment.split_once('?') else {
        return without_fragment.to_string();
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty() && !is_tracking_param(param_name(pair)))
        .collect();

    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, kept.join("&"))
    }
}

fn param_name(pair: &str) -> &str {
    pair.split_once('=').map_or(pair, |(name, _)| name)
}

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with(TRACKING_PREFIX) || TRACKING_PARAMS.contains(&name.as_str())
}
