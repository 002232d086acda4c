//! Field definition registry
//!
//! The definition list of an effect table is always
//! `shared ++ custom ++ table-specific`, in that order. Shared and
//! table-specific catalogs are fixed and built once; the custom part and the
//! hidden shared columns come from the tenant configuration row.

use crate::db::config::{load_custom, load_hidden, CustomConfig, HiddenConfig};
use crate::error::Result;
use crate::types::{EnumEntry, FieldDef, FieldRole, HumanEffectsTable, Storage};
use once_cell::sync::Lazy;
use sqlx::SqliteConnection;

static SHARED_DEFS: Lazy<Vec<FieldDef>> = Lazy::new(|| {
    vec![
        FieldDef::enumeration(
            "Sex",
            "sex",
            "sex",
            vec![
                EnumEntry::new("m", "M-Male"),
                EnumEntry::new("f", "F-Female"),
                EnumEntry::new("o", "O-Other non-binary"),
            ],
        )
        .with_storage(Storage::Shared),
        FieldDef::enumeration(
            "Age",
            "age",
            "age",
            vec![
                EnumEntry::new("0-14", "Children (0-14)"),
                EnumEntry::new("15-64", "Adults (15-64)"),
                EnumEntry::new("65+", "Elderly (65+)"),
            ],
        )
        .with_storage(Storage::Shared),
        FieldDef::enumeration(
            "Disability",
            "disability",
            "disability",
            vec![
                EnumEntry::new("none", "No disabilities"),
                EnumEntry::new("physical", "Physical impairment"),
                EnumEntry::new("sensory", "Sensory impairment"),
                EnumEntry::new("intellectual", "Intellectual impairment"),
                EnumEntry::new("psychosocial", "Psychosocial impairment"),
                EnumEntry::new("multiple", "Multiple impairments"),
            ],
        )
        .with_storage(Storage::Shared),
        FieldDef::enumeration(
            "Global poverty line",
            "globalPovertyLine",
            "global_poverty_line",
            poverty_line_values(),
        )
        .with_storage(Storage::Shared),
        FieldDef::enumeration(
            "National poverty line",
            "nationalPovertyLine",
            "national_poverty_line",
            poverty_line_values(),
        )
        .with_storage(Storage::Shared),
    ]
});

fn poverty_line_values() -> Vec<EnumEntry> {
    vec![
        EnumEntry::new("below", "Below"),
        EnumEntry::new("above", "Above"),
    ]
}

fn assisted_def() -> FieldDef {
    FieldDef::enumeration(
        "Assisted",
        "assisted",
        "assisted",
        vec![
            EnumEntry::new("assisted", "Assisted"),
            EnumEntry::new("not_assisted", "Not assisted"),
        ],
    )
}

static DEATHS_DEFS: Lazy<Vec<FieldDef>> =
    Lazy::new(|| vec![FieldDef::number("Deaths", "deaths", "deaths")]);

static INJURED_DEFS: Lazy<Vec<FieldDef>> =
    Lazy::new(|| vec![FieldDef::number("Injured", "injured", "injured")]);

static MISSING_DEFS: Lazy<Vec<FieldDef>> = Lazy::new(|| {
    vec![
        FieldDef::date("As of", "asOf", "as_of"),
        FieldDef::number("Missing", "missing", "missing"),
    ]
});

static AFFECTED_DEFS: Lazy<Vec<FieldDef>> = Lazy::new(|| {
    vec![
        FieldDef::number("Directly affected", "direct", "direct"),
        FieldDef::number("Indirectly affected", "indirect", "indirect"),
    ]
});

static DISPLACED_DEFS: Lazy<Vec<FieldDef>> = Lazy::new(|| {
    vec![
        assisted_def(),
        FieldDef::enumeration(
            "Timing",
            "timing",
            "timing",
            vec![
                EnumEntry::new("preemptive", "Pre-emptive"),
                EnumEntry::new("reactive", "Reactive"),
            ],
        ),
        FieldDef::number("Short term (less than 10 days)", "short", "short"),
        FieldDef::number("Medium short term (10-30 days)", "mediumShort", "medium_short"),
        FieldDef::number("Medium long term (1-3 months)", "mediumLong", "medium_long"),
        FieldDef::number("Long term (more than 3 months)", "long", "long"),
        FieldDef::number("Permanent", "permanent", "permanent"),
    ]
});

static DISPLACEMENT_STOCKS_DEFS: Lazy<Vec<FieldDef>> = Lazy::new(|| {
    vec![
        assisted_def(),
        FieldDef::number("Pre-emptive", "preemptive", "preemptive"),
        FieldDef::number("Reactive", "reactive", "reactive"),
    ]
});

/// Full shared catalog, ignoring the hidden-columns configuration
pub fn shared_defs_all() -> &'static [FieldDef] {
    &SHARED_DEFS
}

/// Shared catalog minus the configured hidden columns
pub fn shared_defs(hidden: &HiddenConfig) -> Vec<FieldDef> {
    SHARED_DEFS
        .iter()
        .filter(|d| !hidden.cols.iter().any(|c| c == &d.db_name))
        .cloned()
        .collect()
}

/// Tenant-defined enum dimensions stored in the custom JSON map
pub fn custom_defs(custom: &CustomConfig) -> Vec<FieldDef> {
    custom
        .config
        .iter()
        .map(|c| {
            FieldDef::enumeration(&c.ui_name, &c.db_name, &c.db_name, c.values.clone())
                .with_storage(Storage::Custom)
                .with_role(FieldRole::Dimension)
        })
        .collect()
}

/// Fixed per-table catalog
pub fn table_defs(table: HumanEffectsTable) -> &'static [FieldDef] {
    match table {
        HumanEffectsTable::Deaths => &DEATHS_DEFS,
        HumanEffectsTable::Injured => &INJURED_DEFS,
        HumanEffectsTable::Missing => &MISSING_DEFS,
        HumanEffectsTable::Affected => &AFFECTED_DEFS,
        HumanEffectsTable::Displaced => &DISPLACED_DEFS,
        HumanEffectsTable::DisplacementStocks => &DISPLACEMENT_STOCKS_DEFS,
    }
}

/// Compose the definition list from already loaded configuration
pub fn compose_defs(
    table: HumanEffectsTable,
    hidden: &HiddenConfig,
    custom: &CustomConfig,
) -> Vec<FieldDef> {
    let mut defs = shared_defs(hidden);
    defs.extend(custom_defs(custom));
    defs.extend(table_defs(table).iter().cloned());
    defs
}

/// Definition list for a table using the stored tenant configuration
pub async fn defs_for_table(
    conn: &mut SqliteConnection,
    table: HumanEffectsTable,
) -> Result<Vec<FieldDef>> {
    let hidden = load_hidden(&mut *conn).await?;
    let custom = load_custom(&mut *conn).await?;
    Ok(compose_defs(table, &hidden, &custom))
}

/// Every column name a custom dimension must not reuse
pub fn reserved_db_names() -> impl Iterator<Item = &'static str> {
    SHARED_DEFS
        .iter()
        .chain(HumanEffectsTable::ALL.iter().flat_map(|t| table_defs(*t).iter()))
        .map(|d| d.db_name.as_str())
        .chain(["id", "dsg_id", "record_id", "custom"])
}
