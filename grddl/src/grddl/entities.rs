//! The XHTML 1.0 entity sets (`xhtml-lat1`, `xhtml-symbol`,
//! `xhtml-special`), which pages declaring an XHTML DOCTYPE may use
//! without defining.

use std::borrow::Cow;

// `xhtml-lat1.ent` covers U+00A0 to U+00FF in order.
const LATIN1: [&str; 96] = [
    "nbsp", "iexcl", "cent", "pound", "curren", "yen", "brvbar", "sect", "uml", "copy", "ordf",
    "laquo", "not", "shy", "reg", "macr", "deg", "plusmn", "sup2", "sup3", "acute", "micro",
    "para", "middot", "cedil", "sup1", "ordm", "raquo", "frac14", "frac12", "frac34", "iquest",
    "Agrave", "Aacute", "Acirc", "Atilde", "Auml", "Aring", "AElig", "Ccedil", "Egrave", "Eacute",
    "Ecirc", "Euml", "Igrave", "Iacute", "Icirc", "Iuml", "ETH", "Ntilde", "Ograve", "Oacute",
    "Ocirc", "Otilde", "Ouml", "times", "Oslash", "Ugrave", "Uacute", "Ucirc", "Uuml", "Yacute",
    "THORN", "szlig", "agrave", "aacute", "acirc", "atilde", "auml", "aring", "aelig", "ccedil",
    "egrave", "eacute", "ecirc", "euml", "igrave", "iacute", "icirc", "iuml", "eth", "ntilde",
    "ograve", "oacute", "ocirc", "otilde", "ouml", "divide", "oslash", "ugrave", "uacute", "ucirc",
    "uuml", "yacute", "thorn", "yuml",
];

const SPECIAL_AND_SYMBOL: &[(&str, u32)] = &[
    // xhtml-special.ent, minus the five XML predefines
    ("OElig", 338),
    ("oelig", 339),
    ("Scaron", 352),
    ("scaron", 353),
    ("Yuml", 376),
    ("circ", 710),
    ("tilde", 732),
    ("ensp", 8194),
    ("emsp", 8195),
    ("thinsp", 8201),
    ("zwnj", 8204),
    ("zwj", 8205),
    ("lrm", 8206),
    ("rlm", 8207),
    ("ndash", 8211),
    ("mdash", 8212),
    ("lsquo", 8216),
    ("rsquo", 8217),
    ("sbquo", 8218),
    ("ldquo", 8220),
    ("rdquo", 8221),
    ("bdquo", 8222),
    ("dagger", 8224),
    ("Dagger", 8225),
    ("permil", 8240),
    ("lsaquo", 8249),
    ("rsaquo", 8250),
    ("euro", 8364),
    // xhtml-symbol.ent
    ("fnof", 402),
    ("Alpha", 913),
    ("Beta", 914),
    ("Gamma", 915),
    ("Delta", 916),
    ("Epsilon", 917),
    ("Zeta", 918),
    ("Eta", 919),
    ("Theta", 920),
    ("Iota", 921),
    ("Kappa", 922),
    ("Lambda", 923),
    ("Mu", 924),
    ("Nu", 925),
    ("Xi", 926),
    ("Omicron", 927),
    ("Pi", 928),
    ("Rho", 929),
    ("Sigma", 931),
    ("Tau", 932),
    ("Upsilon", 933),
    ("Phi", 934),
    ("Chi", 935),
    ("Psi", 936),
    ("Omega", 937),
    ("alpha", 945),
    ("beta", 946),
    ("gamma", 947),
    ("delta", 948),
    ("epsilon", 949),
    ("zeta", 950),
    ("eta", 951),
    ("theta", 952),
    ("iota", 953),
    ("kappa", 954),
    ("lambda", 955),
    ("mu", 956),
    ("nu", 957),
    ("xi", 958),
    ("omicron", 959),
    ("pi", 960),
    ("rho", 961),
    ("sigmaf", 962),
    ("sigma", 963),
    ("tau", 964),
    ("upsilon", 965),
    ("phi", 966),
    ("chi", 967),
    ("psi", 968),
    ("omega", 969),
    ("thetasym", 977),
    ("upsih", 978),
    ("piv", 982),
    ("bull", 8226),
    ("hellip", 8230),
    ("prime", 8242),
    ("Prime", 8243),
    ("oline", 8254),
    ("frasl", 8260),
    ("weierp", 8472),
    ("image", 8465),
    ("real", 8476),
    ("trade", 8482),
    ("alefsym", 8501),
    ("larr", 8592),
    ("uarr", 8593),
    ("rarr", 8594),
    ("darr", 8595),
    ("harr", 8596),
    ("crarr", 8629),
    ("lArr", 8656),
    ("uArr", 8657),
    ("rArr", 8658),
    ("dArr", 8659),
    ("hArr", 8660),
    ("forall", 8704),
    ("part", 8706),
    ("exist", 8707),
    ("empty", 8709),
    ("nabla", 8711),
    ("isin", 8712),
    ("notin", 8713),
    ("ni", 8715),
    ("prod", 8719),
    ("sum", 8721),
    ("minus", 8722),
    ("lowast", 8727),
    ("radic", 8730),
    ("prop", 8733),
    ("infin", 8734),
    ("ang", 8736),
    ("and", 8743),
    ("or", 8744),
    ("cap", 8745),
    ("cup", 8746),
    ("int", 8747),
    ("there4", 8756),
    ("sim", 8764),
    ("cong", 8773),
    ("asymp", 8776),
    ("ne", 8800),
    ("equiv", 8801),
    ("le", 8804),
    ("ge", 8805),
    ("sub", 8834),
    ("sup", 8835),
    ("nsub", 8836),
    ("sube", 8838),
    ("supe", 8839),
    ("oplus", 8853),
    ("otimes", 8855),
    ("perp", 8869),
    ("sdot", 8901),
    ("lceil", 8968),
    ("rceil", 8969),
    ("lfloor", 8970),
    ("rfloor", 8971),
    ("lang", 9001),
    ("rang", 9002),
    ("loz", 9674),
    ("spades", 9824),
    ("clubs", 9827),
    ("hearts", 9829),
    ("diams", 9830),
];

fn code_point(name: &str) -> Option<u32> {
    if let Some(index) = LATIN1.iter().position(|&entity| entity == name) {
        return u32::try_from(index).ok().map(|index| 0xA0 + index);
    }

    SPECIAL_AND_SYMBOL
        .iter()
        .find(|(entity, _)| *entity == name)
        .map(|&(_, code)| code)
}

/// Rewrites references to XHTML entities as character references, so the
/// document parses without its external DTD.
///
/// Only documents with a DOCTYPE are touched, and entities the internal
/// subset declares itself keep their own definition. Comments, CDATA
/// sections and processing instructions are copied as they are.
pub(crate) fn expand(text: &str) -> Cow<'_, str> {
    let Some(doctype) = text.find("<!DOCTYPE") else {
        return Cow::Borrowed(text);
    };
    let Some(body) = doctype_end(text, doctype) else {
        return Cow::Borrowed(text);
    };
    let declared = declared_entities(&text[doctype..body]);

    let mut output = String::new();
    let mut copied = 0;
    let mut at = body;

    while let Some(offset) = text[at..].find(['<', '&']) {
        at += offset;
        let rest = &text[at..];

        let skip_to = [("<!--", "-->"), ("<![CDATA[", "]]>"), ("<?", "?>")]
            .into_iter()
            .find(|(open, _)| rest.starts_with(open))
            .map(|(open, close)| {
                rest[open.len()..]
                    .find(close)
                    .map_or(text.len(), |end| at + open.len() + end + close.len())
            });
        if let Some(end) = skip_to {
            at = end;
            continue;
        }

        if rest.starts_with('&') {
            let name_len = rest[1..]
                .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-' || c == '.'))
                .unwrap_or(rest.len() - 1);
            let name = &rest[1..1 + name_len];

            if rest[1 + name_len..].starts_with(';') && !declared.contains(&name) {
                if let Some(code) = code_point(name) {
                    output.push_str(&text[copied..at]);
                    output.push_str(&format!("&#{code};"));
                    at += name_len + 2;
                    copied = at;
                    continue;
                }
            }
        }

        at += 1;
    }

    if copied == 0 {
        return Cow::Borrowed(text);
    }
    output.push_str(&text[copied..]);
    Cow::Owned(output)
}

/// The offset just past the DOCTYPE declaration starting at `start`.
fn doctype_end(text: &str, start: usize) -> Option<usize> {
    let mut quote = None;
    let mut in_subset = false;

    for (offset, c) in text[start..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => in_subset = true,
            (None, ']') => in_subset = false,
            (None, '>') if !in_subset => return Some(start + offset + 1),
            _ => {}
        }
    }

    None
}

/// Names of the general entities declared in a DOCTYPE's internal subset.
fn declared_entities(doctype: &str) -> Vec<&str> {
    doctype
        .match_indices("<!ENTITY")
        .filter_map(|(at, declaration)| {
            let rest = doctype[at + declaration.len()..].trim_start();
            if rest.starts_with('%') {
                return None;
            }
            rest.split(|c: char| c.is_whitespace()).next()
        })
        .collect()
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn latin1_is_contiguous() {
        assert_eq!(code_point("nbsp"), Some(0xA0));
        assert_eq!(code_point("copy"), Some(0xA9));
        assert_eq!(code_point("yuml"), Some(0xFF));
        assert_eq!(code_point("euro"), Some(8364));
        assert_eq!(code_point("amp"), None);
    }

    #[test]
    fn references_become_character_references() {
        let page = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">
<html><p title="&copy;">a&nbsp;b &amp; &mdash;&unknown;</p></html>"#;

        assert_eq!(
            expand(page),
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">
<html><p title="&#169;">a&#160;b &amp; &#8212;&unknown;</p></html>"#
        );
    }

    #[test]
    fn documents_without_a_doctype_are_untouched() {
        assert!(matches!(expand("<p>a&nbsp;b</p>"), Cow::Borrowed(_)));
    }

    #[test]
    fn marked_sections_and_local_entities_are_kept() {
        let page = r#"<!DOCTYPE doc [
  <!ENTITY nbsp "~">
  <!ENTITY % local "ignored">
]>
<doc><!-- &hellip; --><![CDATA[&hellip;]]>&nbsp;&hellip;</doc>"#;

        assert_eq!(
            expand(page),
            r#"<!DOCTYPE doc [
  <!ENTITY nbsp "~">
  <!ENTITY % local "ignored">
]>
<doc><!-- &hellip; --><![CDATA[&hellip;]]>&nbsp;&#8230;</doc>"#
        );
    }
}
