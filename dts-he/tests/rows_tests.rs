//! Integration tests for effect row create / update / delete / get / validate

use chrono::NaiveDate;
use dts_he::db::config::{save_custom, CustomConfig, CustomDimension, HiddenConfig};
use dts_he::db::rows::{clear_data, count_rows, create, delete_rows, get, update, validate};
use dts_he::defs::{compose_defs, defs_for_table, shared_defs_all, table_defs};
use dts_he::types::EnumEntry;
use dts_he::{Error, FieldDef, HeErrorCode, HumanEffectsTable, RawRow, Value};
use serde_json::{json, Value as Json};
use sqlx::SqlitePool;

async fn setup() -> (SqlitePool, String) {
    let pool = dts_he::db::init_memory_database().await.unwrap();
    let record_id = dts_common::db::create_disaster_record(&pool).await.unwrap();
    (pool, record_id)
}

/// sex (shared) + deaths
fn sex_deaths_defs() -> Vec<FieldDef> {
    vec![
        shared_defs_all()[0].clone(),
        table_defs(HumanEffectsTable::Deaths)[0].clone(),
    ]
}

fn row(values: Vec<Json>) -> RawRow {
    values.into_iter().map(Some).collect()
}

fn enum_value(key: &str) -> Option<Value> {
    Some(Value::Enum(key.to_string()))
}

fn number(n: i64) -> Option<Value> {
    Some(Value::Number(n))
}

async fn create_rows(
    pool: &SqlitePool,
    table: HumanEffectsTable,
    record_id: &str,
    defs: &[FieldDef],
    rows: &[RawRow],
    string_mode: bool,
) -> Vec<String> {
    let mut tx = pool.begin().await.unwrap();
    let ids = create(&mut tx, table, record_id, defs, rows, string_mode)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    ids
}

async fn table_count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_round_trip_all_fields() {
    let (pool, record_id) = setup().await;
    let defs = compose_defs(
        HumanEffectsTable::Missing,
        &HiddenConfig::default(),
        &CustomConfig::default(),
    );
    let input = row(vec![
        json!("f"),
        json!("15-64"),
        json!("none"),
        json!("below"),
        json!("above"),
        json!("2024-02-01"),
        json!(12),
    ]);

    let ids = create_rows(
        &pool,
        HumanEffectsTable::Missing,
        &record_id,
        &defs,
        &[input],
        false,
    )
    .await;

    let mut conn = pool.acquire().await.unwrap();
    let result = get(&mut conn, HumanEffectsTable::Missing, &record_id, &defs)
        .await
        .unwrap();

    assert_eq!(result.ids, ids);
    assert_eq!(
        result.data[0],
        vec![
            enum_value("f"),
            enum_value("15-64"),
            enum_value("none"),
            enum_value("below"),
            enum_value("above"),
            Some(Value::Date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())),
            number(12),
        ]
    );
    assert_eq!(result.defs, defs);
}

#[tokio::test]
async fn test_round_trip_nulls() {
    let (pool, record_id) = setup().await;
    let defs = sex_deaths_defs();

    create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &record_id,
        &defs,
        &[row(vec![Json::Null, Json::Null])],
        false,
    )
    .await;

    let mut conn = pool.acquire().await.unwrap();
    let result = get(&mut conn, HumanEffectsTable::Deaths, &record_id, &defs)
        .await
        .unwrap();
    assert_eq!(result.data, vec![vec![None, None]]);
}

#[tokio::test]
async fn test_string_mode_stores_same_data_as_native() {
    let (pool, native_record) = setup().await;
    let string_record = dts_common::db::create_disaster_record(&pool).await.unwrap();
    let defs = sex_deaths_defs();

    create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &native_record,
        &defs,
        &[row(vec![json!("m"), json!(3)]), row(vec![json!("f"), Json::Null])],
        false,
    )
    .await;
    create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &string_record,
        &defs,
        &[row(vec![json!("m"), json!("3")]), row(vec![json!("f"), json!("")])],
        true,
    )
    .await;

    let mut conn = pool.acquire().await.unwrap();
    let native = get(&mut conn, HumanEffectsTable::Deaths, &native_record, &defs)
        .await
        .unwrap();
    let strings = get(&mut conn, HumanEffectsTable::Deaths, &string_record, &defs)
        .await
        .unwrap();
    assert_eq!(native.data, strings.data);
    drop(conn);

    // Stored column type is INTEGER in both cases
    let sql = "SELECT DISTINCT typeof(deaths) FROM deaths WHERE deaths IS NOT NULL";
    let types: Vec<String> = sqlx::query_scalar(sql)
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(types, vec!["integer"]);
}

#[tokio::test]
async fn test_partial_update_preserves_untouched_fields() {
    let (pool, record_id) = setup().await;
    let defs = sex_deaths_defs();
    let ids = create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &record_id,
        &defs,
        &[row(vec![json!("m"), json!(1)])],
        false,
    )
    .await;

    let mut tx = pool.begin().await.unwrap();
    update(
        &mut tx,
        HumanEffectsTable::Deaths,
        &defs,
        &ids,
        &[vec![None, Some(json!("3"))]],
        true,
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let result = get(&mut conn, HumanEffectsTable::Deaths, &record_id, &defs)
        .await
        .unwrap();
    assert_eq!(result.data, vec![vec![enum_value("m"), number(3)]]);
}

#[tokio::test]
async fn test_null_clears_field_in_both_modes() {
    let (pool, record_id) = setup().await;
    let defs = sex_deaths_defs();
    let ids = create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &record_id,
        &defs,
        &[row(vec![json!("m"), json!(1)]), row(vec![json!("f"), json!(2)])],
        false,
    )
    .await;

    let mut tx = pool.begin().await.unwrap();
    update(
        &mut tx,
        HumanEffectsTable::Deaths,
        &defs,
        &ids[..1],
        &[vec![Some(Json::Null), None]],
        false,
    )
    .await
    .unwrap();
    update(
        &mut tx,
        HumanEffectsTable::Deaths,
        &defs,
        &ids[1..],
        &[vec![None, Some(Json::Null)]],
        true,
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let result = get(&mut conn, HumanEffectsTable::Deaths, &record_id, &defs)
        .await
        .unwrap();
    assert_eq!(result.row(&ids[0]).unwrap(), &[None, number(1)]);
    assert_eq!(result.row(&ids[1]).unwrap(), &[enum_value("f"), None]);
}

#[tokio::test]
async fn test_update_unknown_id_rejected() {
    let (pool, _record_id) = setup().await;
    let defs = sex_deaths_defs();

    let mut tx = pool.begin().await.unwrap();
    let err = update(
        &mut tx,
        HumanEffectsTable::Deaths,
        &defs,
        &["missing-row".to_string()],
        &[vec![None, Some(json!(1))]],
        false,
    )
    .await
    .unwrap_err();

    match err {
        Error::Rejected(e) => {
            assert_eq!(e.code, HeErrorCode::Other);
            assert_eq!(e.message, "Record not found for id: missing-row");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_dimensions_flag_both_rows_sorted() {
    let (pool, record_id) = setup().await;
    let defs = sex_deaths_defs();
    let ids = create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &record_id,
        &defs,
        &[
            row(vec![json!("m"), json!(1)]),
            row(vec![json!("f"), json!(1)]),
            row(vec![json!("m"), json!(9)]),
        ],
        false,
    )
    .await;

    let mut conn = pool.acquire().await.unwrap();
    let errors = validate(&mut conn, HumanEffectsTable::Deaths, &record_id, &defs)
        .await
        .unwrap();

    let mut expected = vec![ids[0].clone(), ids[2].clone()];
    expected.sort();
    let flagged: Vec<String> = errors.iter().filter_map(|e| e.row_id.clone()).collect();
    assert_eq!(flagged, expected);
    assert!(errors.iter().all(|e| e.code == HeErrorCode::DuplicateDimension));
}

#[tokio::test]
async fn test_validate_clean_record() {
    let (pool, record_id) = setup().await;
    let defs = sex_deaths_defs();
    create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &record_id,
        &defs,
        &[row(vec![json!("m"), json!(1)]), row(vec![json!("f"), json!(1)])],
        false,
    )
    .await;

    let mut conn = pool.acquire().await.unwrap();
    let errors = validate(&mut conn, HumanEffectsTable::Deaths, &record_id, &defs)
        .await
        .unwrap();
    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_get_sorts_by_values_nulls_first() {
    let (pool, record_id) = setup().await;
    let defs = sex_deaths_defs();

    create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &record_id,
        &defs,
        &[
            row(vec![json!("m"), json!(1)]),
            row(vec![json!("f"), json!(2)]),
        ],
        false,
    )
    .await;

    let mut conn = pool.acquire().await.unwrap();
    let result = get(&mut conn, HumanEffectsTable::Deaths, &record_id, &defs)
        .await
        .unwrap();
    assert_eq!(
        result.data,
        vec![vec![enum_value("f"), number(2)], vec![enum_value("m"), number(1)]]
    );
    drop(conn);

    create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &record_id,
        &defs,
        &[
            row(vec![json!("m"), Json::Null]),
            row(vec![Json::Null, json!(5)]),
        ],
        false,
    )
    .await;

    let mut conn = pool.acquire().await.unwrap();
    let result = get(&mut conn, HumanEffectsTable::Deaths, &record_id, &defs)
        .await
        .unwrap();
    assert_eq!(
        result.data,
        vec![
            vec![None, number(5)],
            vec![enum_value("f"), number(2)],
            vec![enum_value("m"), None],
            vec![enum_value("m"), number(1)],
        ]
    );
}

#[tokio::test]
async fn test_get_only_returns_own_record() {
    let (pool, record_id) = setup().await;
    let other_record = dts_common::db::create_disaster_record(&pool).await.unwrap();
    let defs = sex_deaths_defs();

    create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &record_id,
        &defs,
        &[row(vec![json!("m"), json!(1)])],
        false,
    )
    .await;
    create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &other_record,
        &defs,
        &[row(vec![json!("f"), json!(2)])],
        false,
    )
    .await;
    create_rows(
        &pool,
        HumanEffectsTable::Injured,
        &record_id,
        &[
            shared_defs_all()[0].clone(),
            table_defs(HumanEffectsTable::Injured)[0].clone(),
        ],
        &[row(vec![json!("o"), json!(7)])],
        false,
    )
    .await;

    let mut conn = pool.acquire().await.unwrap();
    let result = get(&mut conn, HumanEffectsTable::Deaths, &record_id, &defs)
        .await
        .unwrap();
    assert_eq!(result.data, vec![vec![enum_value("m"), number(1)]]);
}

#[tokio::test]
async fn test_delete_leaves_no_orphans() {
    let (pool, record_id) = setup().await;
    let defs = sex_deaths_defs();
    let ids = create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &record_id,
        &defs,
        &[row(vec![json!("m"), json!(1)]), row(vec![json!("f"), json!(2)])],
        false,
    )
    .await;

    let mut tx = pool.begin().await.unwrap();
    let deleted = delete_rows(&mut tx, HumanEffectsTable::Deaths, &ids)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(deleted, ids);

    let mut conn = pool.acquire().await.unwrap();
    let result = get(&mut conn, HumanEffectsTable::Deaths, &record_id, &defs)
        .await
        .unwrap();
    assert!(result.is_empty());
    drop(conn);

    assert_eq!(table_count(&pool, "deaths").await, 0);
    assert_eq!(table_count(&pool, "human_dsg").await, 0);
}

#[tokio::test]
async fn test_clear_data_only_touches_one_table() {
    let (pool, record_id) = setup().await;
    let deaths_defs = sex_deaths_defs();
    let injured_defs = vec![
        shared_defs_all()[0].clone(),
        table_defs(HumanEffectsTable::Injured)[0].clone(),
    ];
    create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &record_id,
        &deaths_defs,
        &[row(vec![json!("m"), json!(1)])],
        false,
    )
    .await;
    create_rows(
        &pool,
        HumanEffectsTable::Injured,
        &record_id,
        &injured_defs,
        &[row(vec![json!("m"), json!(4)])],
        false,
    )
    .await;

    let mut tx = pool.begin().await.unwrap();
    let cleared = clear_data(&mut tx, HumanEffectsTable::Deaths, &record_id)
        .await
        .unwrap();
    assert_eq!(cleared.len(), 1);
    let injured = count_rows(&mut tx, HumanEffectsTable::Injured, &record_id)
        .await
        .unwrap();
    assert_eq!(injured, 1);
    tx.commit().await.unwrap();

    assert_eq!(table_count(&pool, "human_dsg").await, 1);
}

#[tokio::test]
async fn test_enum_rejection_commits_nothing() {
    let (pool, record_id) = setup().await;
    let defs = sex_deaths_defs();

    {
        let mut tx = pool.begin().await.unwrap();
        let err = create(
            &mut tx,
            HumanEffectsTable::Deaths,
            &record_id,
            &defs,
            &[row(vec![json!("m"), json!(1)]), row(vec![json!("x"), json!(2)])],
            false,
        )
        .await
        .unwrap_err();

        match &err {
            Error::Rejected(e) => {
                assert_eq!(e.code, HeErrorCode::InvalidValue);
                assert!(e.message.contains("sex"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        // tx dropped without commit
    }

    assert_eq!(table_count(&pool, "deaths").await, 0);
    assert_eq!(table_count(&pool, "human_dsg").await, 0);

    // Same for update
    let ids = create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &record_id,
        &defs,
        &[row(vec![json!("m"), json!(1)])],
        false,
    )
    .await;
    {
        let mut tx = pool.begin().await.unwrap();
        let err = update(
            &mut tx,
            HumanEffectsTable::Deaths,
            &defs,
            &ids,
            &[vec![Some(json!("F")), None]],
            false,
        )
        .await
        .unwrap_err();
        assert!(err.is_rejection());
    }

    let mut conn = pool.acquire().await.unwrap();
    let result = get(&mut conn, HumanEffectsTable::Deaths, &record_id, &defs)
        .await
        .unwrap();
    assert_eq!(result.data, vec![vec![enum_value("m"), number(1)]]);
}

#[tokio::test]
async fn test_record_delete_cascades() {
    let (pool, record_id) = setup().await;
    let defs = sex_deaths_defs();
    create_rows(
        &pool,
        HumanEffectsTable::Deaths,
        &record_id,
        &defs,
        &[row(vec![json!("m"), json!(1)])],
        false,
    )
    .await;

    dts_common::db::delete_disaster_record(&pool, &record_id)
        .await
        .unwrap();

    assert_eq!(table_count(&pool, "human_dsg").await, 0);
    assert_eq!(table_count(&pool, "deaths").await, 0);
}

#[tokio::test]
async fn test_create_for_unknown_record_fails() {
    let (pool, _record_id) = setup().await;
    let defs = sex_deaths_defs();

    let mut tx = pool.begin().await.unwrap();
    let err = create(
        &mut tx,
        HumanEffectsTable::Deaths,
        "no-such-record",
        &defs,
        &[row(vec![json!("m"), json!(1)])],
        false,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Database(_)));
}

#[tokio::test]
async fn test_custom_dimension_merge() {
    let (pool, record_id) = setup().await;
    let mut conn = pool.acquire().await.unwrap();
    save_custom(
        &mut conn,
        &CustomConfig {
            config: vec![
                CustomDimension {
                    ui_name: "Ethnicity".to_string(),
                    db_name: "ethnicity".to_string(),
                    values: vec![
                        EnumEntry::new("a", "Group A"),
                        EnumEntry::new("b", "Group B"),
                    ],
                },
                CustomDimension {
                    ui_name: "Region".to_string(),
                    db_name: "region".to_string(),
                    values: vec![
                        EnumEntry::new("north", "North"),
                        EnumEntry::new("south", "South"),
                    ],
                },
            ],
        },
    )
    .await
    .unwrap();
    drop(conn);

    let mut tx = pool.begin().await.unwrap();
    let defs = defs_for_table(&mut tx, HumanEffectsTable::Injured)
        .await
        .unwrap();
    let names: Vec<&str> = defs.iter().map(|d| d.js_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "sex",
            "age",
            "disability",
            "globalPovertyLine",
            "nationalPovertyLine",
            "ethnicity",
            "region",
            "injured"
        ]
    );

    let ids = create(
        &mut tx,
        HumanEffectsTable::Injured,
        &record_id,
        &defs,
        &[row(vec![
            json!("m"),
            json!("0-14"),
            json!("none"),
            json!("below"),
            json!("below"),
            json!("a"),
            json!("north"),
            json!(5),
        ])],
        false,
    )
    .await
    .unwrap();

    // Only the region changes; ethnicity must survive the merge
    let mut partial: RawRow = vec![None; defs.len()];
    partial[6] = Some(json!("south"));
    update(&mut tx, HumanEffectsTable::Injured, &defs, &ids, &[partial], false)
        .await
        .unwrap();

    let result = get(&mut tx, HumanEffectsTable::Injured, &record_id, &defs)
        .await
        .unwrap();
    assert_eq!(result.data[0][5], enum_value("a"));
    assert_eq!(result.data[0][6], enum_value("south"));
    assert_eq!(result.data[0][7], number(5));

    // Null removes the key
    let mut clear: RawRow = vec![None; defs.len()];
    clear[5] = Some(Json::Null);
    update(&mut tx, HumanEffectsTable::Injured, &defs, &ids, &[clear], false)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let custom: String = sqlx::query_scalar("SELECT custom FROM human_dsg")
        .fetch_one(&pool)
        .await
        .unwrap();
    let custom: Json = serde_json::from_str(&custom).unwrap();
    assert_eq!(custom, json!({"region": "south"}));
}

#[tokio::test]
async fn test_hidden_columns_not_read_or_written() {
    let (pool, record_id) = setup().await;
    let hidden = HiddenConfig {
        cols: vec![
            "age".to_string(),
            "disability".to_string(),
            "global_poverty_line".to_string(),
            "national_poverty_line".to_string(),
        ],
    };
    let defs = compose_defs(HumanEffectsTable::Affected, &hidden, &CustomConfig::default());
    assert_eq!(defs.len(), 3);

    create_rows(
        &pool,
        HumanEffectsTable::Affected,
        &record_id,
        &defs,
        &[row(vec![json!("f"), json!(10), json!(20)])],
        false,
    )
    .await;

    let mut conn = pool.acquire().await.unwrap();
    let result = get(&mut conn, HumanEffectsTable::Affected, &record_id, &defs)
        .await
        .unwrap();
    assert_eq!(result.data, vec![vec![enum_value("f"), number(10), number(20)]]);
    drop(conn);

    let age: Option<String> = sqlx::query_scalar("SELECT age FROM human_dsg")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(age, None);
}
