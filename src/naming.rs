use crate::error::{Result, TilerError};
use crate::schema::format_time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Placeholder replaced by the 3-digit tile ordinal. The base name carries it
/// unresolved; the writer substitutes each tile's ordinal.
pub const TILE_TOKEN: &str = "{tilenum}";

/// Largest ordinal that fits the 3-digit tile index.
pub const MAX_TILE_ORDINAL: usize = 999;

/// Start/creation time pattern of the standard convention.
pub const STANDARD_TIME_FORMAT: &str = "%Y%j%H%M%S";

/// What to do when a code table has no entry for a key.
///
/// One policy applies to the source, platform, and color tables alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LookupPolicy {
    /// Substitute the table's fallback code and log a warning
    #[default]
    Fallback,
    /// Fail with [`TilerError::Lookup`]
    Strict,
}

/// Mapping from lowercase names to short codes, with a fallback code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeTable {
    pub codes: BTreeMap<String, String>,
    pub fallback: String,
}

impl CodeTable {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>, fallback: &str) -> Self {
        Self {
            codes: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            fallback: fallback.to_string(),
        }
    }

    fn lookup(&self, table: &'static str, key: &str, policy: LookupPolicy) -> Result<&str> {
        let found = self
            .codes
            .get(key)
            .or_else(|| self.codes.get(&key.to_lowercase()));

        match (found, policy) {
            (Some(code), _) => Ok(code.as_str()),
            (None, LookupPolicy::Strict) => Err(TilerError::Lookup {
                table,
                key: key.to_string(),
            }),
            (None, LookupPolicy::Fallback) => {
                warn!(table, key, fallback = %self.fallback, "No code for key, using fallback");
                Ok(self.fallback.as_str())
            }
        }
    }
}

/// Sensor, platform, and color-channel code tables
///
/// `policy` is not read from the tables' JSON; the run configuration's
/// `lookup_policy` sets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodeTables {
    pub source: CodeTable,
    pub platform: CodeTable,
    pub color: CodeTable,
    #[serde(skip)]
    pub policy: LookupPolicy,
}

impl Default for CodeTables {
    fn default() -> Self {
        Self {
            source: CodeTable::new(
                [("abi", "ABI"), ("ahi", "HFD"), ("fci", "MFD"), ("seviri", "MFD")],
                "UNK",
            ),
            platform: CodeTable::new(
                [("goes-17", "WFD"), ("goes-16", "EFD"), ("himawari-8", "EFD")],
                "UNK",
            ),
            color: CodeTable::new(
                [
                    ("red", "R"),
                    ("green", "G"),
                    ("blue", "B"),
                    ("geocolor_r", "R"),
                    ("geocolor_g", "G"),
                    ("geocolor_b", "B"),
                ],
                "R",
            ),
            policy: LookupPolicy::default(),
        }
    }
}

impl CodeTables {
    pub fn source_code(&self, source_name: &str) -> Result<&str> {
        self.source.lookup("source", source_name, self.policy)
    }

    pub fn platform_code(&self, platform_name: &str) -> Result<&str> {
        self.platform.lookup("platform", platform_name, self.policy)
    }

    pub fn color_code(&self, product_name: &str) -> Result<&str> {
        self.color.lookup("color", product_name, self.policy)
    }
}

/// File naming convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingConvention {
    /// `OR_<SOURCE>-<PRODUCT>-T{tilenum}_<PLATFORM>_s<start>_c<creation>`
    Standard,
    /// `RAMMB_A2ECFG_GEOC_<COLOR>_<YYYYMMDD>_<HHMM>_T{tilenum}`
    CompositeColor,
}

impl NamingConvention {
    /// Composite-color (GeoColor) products use the alternate convention.
    pub fn for_product(product_name: &str) -> Self {
        if product_name.to_lowercase().contains("geocolor") {
            NamingConvention::CompositeColor
        } else {
            NamingConvention::Standard
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamingContext {
    pub source_name: String,
    pub platform_name: String,
    pub product_name: String,
    pub start_datetime: DateTime<Utc>,
    pub creation_datetime: DateTime<Utc>,
    /// Appended verbatim, e.g. `.nc`
    pub extension: Option<String>,
    pub convention: NamingConvention,
}

/// Build the base file name containing exactly one [`TILE_TOKEN`].
pub fn assemble_template(ctx: &NamingContext, tables: &CodeTables) -> Result<String> {
    let mut fname = match ctx.convention {
        NamingConvention::Standard => {
            let source = tables.source_code(&ctx.source_name)?;
            let platform = tables.platform_code(&ctx.platform_name)?;
            let product = ctx.product_name.to_uppercase();
            let tile = format!("T{}", TILE_TOKEN);
            let head = [source, product.as_str(), tile.as_str()].join("-");
            [
                "OR".to_string(),
                head,
                platform.to_string(),
                format!("s{}", format_time(&ctx.start_datetime, STANDARD_TIME_FORMAT)?),
                format!("c{}", format_time(&ctx.creation_datetime, STANDARD_TIME_FORMAT)?),
            ]
            .join("_")
        }
        NamingConvention::CompositeColor => {
            let color = tables.color_code(&ctx.product_name.to_lowercase())?;
            [
                "RAMMB_A2ECFG_GEOC".to_string(),
                color.to_string(),
                format_time(&ctx.start_datetime, "%Y%m%d")?,
                format_time(&ctx.start_datetime, "%H%M")?,
                format!("T{}", TILE_TOKEN),
            ]
            .join("_")
        }
    };

    if let Some(ext) = ctx.extension.as_deref() {
        fname.push_str(ext);
    }

    Ok(fname)
}

/// Check that a template carries exactly one tile-index token.
pub fn validate_template(template: &str) -> Result<()> {
    match template.matches(TILE_TOKEN).count() {
        1 => Ok(()),
        0 => Err(TilerError::Config(format!(
            "File name template '{}' must contain '{}'",
            template, TILE_TOKEN
        ))),
        n => Err(TilerError::Config(format!(
            "File name template '{}' contains '{}' {} times, expected once",
            template, TILE_TOKEN, n
        ))),
    }
}

/// Zero-padded 3-digit index for a 1-based tile ordinal.
pub fn tile_index(ordinal: usize) -> Result<String> {
    if !(1..=MAX_TILE_ORDINAL).contains(&ordinal) {
        return Err(TilerError::Config(format!(
            "Tile ordinal {} is outside 1..={}",
            ordinal, MAX_TILE_ORDINAL
        )));
    }
    Ok(format!("{:03}", ordinal))
}

/// Substitute the tile ordinal into a validated template.
pub fn resolve_tile_name(template: &str, ordinal: usize) -> Result<String> {
    validate_template(template)?;
    Ok(template.replacen(TILE_TOKEN, &tile_index(ordinal)?, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context(product: &str, platform: &str, convention: NamingConvention) -> NamingContext {
        NamingContext {
            source_name: "abi".to_string(),
            platform_name: platform.to_string(),
            product_name: product.to_string(),
            start_datetime: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            creation_datetime: Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap(),
            extension: None,
            convention,
        }
    }

    #[test]
    fn test_standard_convention() {
        let ctx = context("Surface-Winds", "goes-16", NamingConvention::Standard);
        let name = assemble_template(&ctx, &CodeTables::default()).unwrap();
        assert_eq!(
            name,
            "OR_ABI-SURFACE-WINDS-T{tilenum}_EFD_s2024061120000_c2024061120500"
        );
    }

    #[test]
    fn test_composite_color_convention() {
        let ctx = context("geocolor_r", "goes-16", NamingConvention::CompositeColor);
        let name = assemble_template(&ctx, &CodeTables::default()).unwrap();
        assert_eq!(name, "RAMMB_A2ECFG_GEOC_R_20240301_1200_T{tilenum}");
    }

    #[test]
    fn test_composite_color_unmapped_uses_default_color() {
        let ctx = context("geocolor_ir", "goes-16", NamingConvention::CompositeColor);
        let name = assemble_template(&ctx, &CodeTables::default()).unwrap();
        assert!(name.starts_with("RAMMB_A2ECFG_GEOC_R_"));
    }

    #[test]
    fn test_extension_is_appended() {
        let mut ctx = context("geocolor_b", "goes-16", NamingConvention::CompositeColor);
        ctx.extension = Some(".nc".to_string());
        let name = assemble_template(&ctx, &CodeTables::default()).unwrap();
        assert_eq!(name, "RAMMB_A2ECFG_GEOC_B_20240301_1200_T{tilenum}.nc");
    }

    #[test]
    fn test_unmapped_platform_uses_fallback() {
        let ctx = context("Surface-Winds", "goes-19", NamingConvention::Standard);
        let name = assemble_template(&ctx, &CodeTables::default()).unwrap();
        assert!(name.contains("_UNK_s2024061120000"), "{name}");
    }

    #[test]
    fn test_unmapped_platform_strict_policy() {
        let ctx = context("Surface-Winds", "goes-19", NamingConvention::Standard);
        let tables = CodeTables {
            policy: LookupPolicy::Strict,
            ..CodeTables::default()
        };
        let err = assemble_template(&ctx, &tables).unwrap_err();
        assert!(matches!(
            err,
            TilerError::Lookup { table: "platform", ref key } if key == "goes-19"
        ));
    }

    #[test]
    fn test_lookup_is_case_insensitive_on_miss() {
        let tables = CodeTables::default();
        assert_eq!(tables.platform_code("GOES-17").unwrap(), "WFD");
        assert_eq!(tables.source_code("AHI").unwrap(), "HFD");
    }

    #[test]
    fn test_for_product() {
        assert_eq!(
            NamingConvention::for_product("GeoColor_G"),
            NamingConvention::CompositeColor
        );
        assert_eq!(
            NamingConvention::for_product("surface-winds"),
            NamingConvention::Standard
        );
    }

    #[test]
    fn test_resolve_round_trip() {
        let template = "OR_ABI-WINDS-T{tilenum}_EFD.nc";
        let prefix = "OR_ABI-WINDS-T".len();
        for k in 1..=MAX_TILE_ORDINAL {
            let name = resolve_tile_name(template, k).unwrap();
            assert_eq!(&name[prefix..prefix + 3], format!("{:03}", k));
            assert!(!name.contains(TILE_TOKEN));
        }
    }

    #[test]
    fn test_resolve_rejects_out_of_range_ordinals() {
        assert!(resolve_tile_name("T{tilenum}", 0).is_err());
        assert!(resolve_tile_name("T{tilenum}", 1000).is_err());
    }

    #[test]
    fn test_validate_template() {
        assert!(validate_template("a_T{tilenum}.nc").is_ok());
        assert!(validate_template("a_T.nc").is_err());
        assert!(validate_template("{tilenum}_{tilenum}").is_err());
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let ctx = context("Surface-Winds", "goes-17", NamingConvention::Standard);
        let tables = CodeTables::default();
        assert_eq!(
            assemble_template(&ctx, &tables).unwrap(),
            assemble_template(&ctx, &tables).unwrap()
        );
    }
}
