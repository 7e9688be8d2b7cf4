//! Boolean parser options, addressable by name.

use std::fmt;
use std::str::FromStr;

use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    Scanning,
    AllowNonNsAttributes,
    AllowOtherParseTypes,
    AllowBagId,
    AllowRdfTypeRdfList,
    NormalizeLanguage,
    NonNfcFatal,
    WarnOtherParseTypes,
    CheckRdfId,
    /// Refuse to fetch anything that is not a local `file:` resource.
    NoNet,
}

impl Feature {
    pub const ALL: [Feature; 10] = [
        Feature::Scanning,
        Feature::AllowNonNsAttributes,
        Feature::AllowOtherParseTypes,
        Feature::AllowBagId,
        Feature::AllowRdfTypeRdfList,
        Feature::NormalizeLanguage,
        Feature::NonNfcFatal,
        Feature::WarnOtherParseTypes,
        Feature::CheckRdfId,
        Feature::NoNet,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::Scanning => "scanning",
            Feature::AllowNonNsAttributes => "allow-non-ns-attributes",
            Feature::AllowOtherParseTypes => "allow-other-parse-types",
            Feature::AllowBagId => "allow-bag-id",
            Feature::AllowRdfTypeRdfList => "allow-rdf-type-rdf-list",
            Feature::NormalizeLanguage => "normalize-language",
            Feature::NonNfcFatal => "non-nfc-fatal",
            Feature::WarnOtherParseTypes => "warn-other-parse-types",
            Feature::CheckRdfId => "check-rdf-id",
            Feature::NoNet => "no-net",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Feature::Scanning => "RDF/XML parser scans for rdf:RDF in XML content",
            Feature::AllowNonNsAttributes => "RDF/XML parser allows bare 'name' rather than namespaced 'rdf:name'",
            Feature::AllowOtherParseTypes => "RDF/XML parser allows user-defined rdf:parseType values",
            Feature::AllowBagId => "RDF/XML parser allows rdf:bagID",
            Feature::AllowRdfTypeRdfList => "RDF/XML parser generates the collection rdf:type rdf:List triple",
            Feature::NormalizeLanguage => "RDF/XML parser normalizes xml:lang values to lowercase",
            Feature::NonNfcFatal => "RDF/XML parser makes non-NFC literals a fatal error",
            Feature::WarnOtherParseTypes => "RDF/XML parser warns about unknown rdf:parseType values",
            Feature::CheckRdfId => "RDF/XML parser checks rdf:ID values for duplicates",
            Feature::NoNet => "Deny network requests",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Feature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|feature| feature.name() == s)
            .ok_or_else(|| Error::UnknownFeature(s.to_owned()))
    }
}

/// The feature flags carried by every parser handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Features {
    pub scanning: bool,
    pub allow_non_ns_attributes: bool,
    pub allow_other_parse_types: bool,
    pub allow_bag_id: bool,
    pub allow_rdf_type_rdf_list: bool,
    pub normalize_language: bool,
    pub non_nfc_fatal: bool,
    pub warn_other_parse_types: bool,
    pub check_rdf_id: bool,
    pub no_net: bool,
}

impl Default for Features {
    fn default() -> Self {
        Features::lax()
    }
}

impl Features {
    pub fn lax() -> Self {
        Features {
            scanning: false,
            allow_non_ns_attributes: true,
            allow_other_parse_types: true,
            allow_bag_id: true,
            allow_rdf_type_rdf_list: false,
            normalize_language: true,
            non_nfc_fatal: false,
            warn_other_parse_types: true,
            check_rdf_id: true,
            no_net: false,
        }
    }

    pub fn strict() -> Self {
        Features {
            allow_non_ns_attributes: false,
            allow_other_parse_types: false,
            allow_bag_id: false,
            non_nfc_fatal: true,
            warn_other_parse_types: false,
            ..Features::lax()
        }
    }

    /// Resets everything the presets cover. `no_net` is left alone.
    pub fn apply_preset(&mut self, strict: bool) {
        let no_net = self.no_net;
        *self = if strict {
            Features::strict()
        } else {
            Features::lax()
        };
        self.no_net = no_net;
    }

    pub fn get(&self, feature: Feature) -> bool {
        *self.slot(feature)
    }

    /// Sets a feature; any non-zero value enables it.
    ///
    /// Negative values are rejected without touching the flags.
    pub fn set(&mut self, feature: Feature, value: i64) -> Result<(), Error> {
        if value < 0 {
            return Err(Error::InvalidFeatureValue { feature, value });
        }

        *self.slot_mut(feature) = value != 0;
        Ok(())
    }

    /// Like [`Features::set`], reading the value as a leading decimal number.
    pub fn set_from_str(&mut self, feature: Feature, value: &str) -> Result<(), Error> {
        self.set(feature, leading_decimal(value))
    }

    fn slot(&self, feature: Feature) -> &bool {
        match feature {
            Feature::Scanning => &self.scanning,
            Feature::AllowNonNsAttributes => &self.allow_non_ns_attributes,
            Feature::AllowOtherParseTypes => &self.allow_other_parse_types,
            Feature::AllowBagId => &self.allow_bag_id,
            Feature::AllowRdfTypeRdfList => &self.allow_rdf_type_rdf_list,
            Feature::NormalizeLanguage => &self.normalize_language,
            Feature::NonNfcFatal => &self.non_nfc_fatal,
            Feature::WarnOtherParseTypes => &self.warn_other_parse_types,
            Feature::CheckRdfId => &self.check_rdf_id,
            Feature::NoNet => &self.no_net,
        }
    }

    fn slot_mut(&mut self, feature: Feature) -> &mut bool {
        match feature {
            Feature::Scanning => &mut self.scanning,
            Feature::AllowNonNsAttributes => &mut self.allow_non_ns_attributes,
            Feature::AllowOtherParseTypes => &mut self.allow_other_parse_types,
            Feature::AllowBagId => &mut self.allow_bag_id,
            Feature::AllowRdfTypeRdfList => &mut self.allow_rdf_type_rdf_list,
            Feature::NormalizeLanguage => &mut self.normalize_language,
            Feature::NonNfcFatal => &mut self.non_nfc_fatal,
            Feature::WarnOtherParseTypes => &mut self.warn_other_parse_types,
            Feature::CheckRdfId => &mut self.check_rdf_id,
            Feature::NoNet => &mut self.no_net,
        }
    }
}

// Optional sign followed by digits; anything else ends the number, and
// a string with no digits at all reads as zero.
fn leading_decimal(value: &str) -> i64 {
    let value = value.trim_start();
    let (negative, digits) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };

    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, digit| {
            acc.saturating_mul(10).saturating_add(i64::from(digit - b'0'))
        });

    if negative { -magnitude } else { magnitude }
}
