//! Black-box tests for the ad-hoc query validation pipeline.
//!
//! Random well-formed SELECTs must be accepted, any two of them joined by a
//! separator must be refused, and arbitrary input must never panic.

use pg_diag_mcp::models::DatabaseType;
use pg_diag_mcp::validation::{Denylist, QueryValidator, ReasonCode, ValidationVerdict};
use rand::Rng;
use rand::seq::SliceRandom;

const TABLES: &[&str] = &["users", "orders", "items", "accounts"];
const COLUMNS: &[&str] = &["id", "name", "email", "score", "total", "status"];

fn validators() -> Vec<QueryValidator> {
    vec![
        QueryValidator::for_database(DatabaseType::PostgreSQL, Denylist::base()),
        QueryValidator::for_database(DatabaseType::SQLite, Denylist::base()),
    ]
}

fn random_select(rng: &mut impl Rng) -> String {
    let n = rng.gen_range(1..=COLUMNS.len());
    let columns: Vec<&str> = COLUMNS.choose_multiple(rng, n).copied().collect();
    let table = TABLES.choose(rng).copied().unwrap_or("users");
    let mut sql = format!("SELECT {} FROM {}", columns.join(", "), table);
    if rng.gen_bool(0.5) {
        let column = COLUMNS.choose(rng).copied().unwrap_or("id");
        sql.push_str(&format!(" WHERE {} > {}", column, rng.gen_range(0..1000)));
    }
    if rng.gen_bool(0.3) {
        sql.push_str(&format!(" ORDER BY {}", columns[0]));
    }
    if rng.gen_bool(0.3) {
        sql.push_str(&format!(" LIMIT {}", rng.gen_range(1..100)));
    }
    sql
}

fn random_garbage(rng: &mut impl Rng) -> String {
    const ALPHABET: &[char] = &[
        'a', 'Z', '0', '9', ' ', '\t', '\n', ';', '\'', '"', '(', ')', ',', '*', '-', '/', '$',
        '\\', '\0', 'é', '中', '🚀',
    ];
    let len = rng.gen_range(0..80);
    (0..len)
        .map(|_| ALPHABET.choose(rng).copied().unwrap_or(' '))
        .collect()
}

#[test]
fn test_scenarios() {
    for validator in validators() {
        assert!(validator.validate("SELECT * FROM users").is_accepted());
        assert_eq!(
            validator
                .validate("SELECT * FROM users; SELECT * FROM posts")
                .reason(),
            Some(ReasonCode::MultipleStatements)
        );
        assert_eq!(
            validator.validate("DROP TABLE users").reason(),
            Some(ReasonCode::DeniedKeyword)
        );
        assert_eq!(
            validator.validate("   ").reason(),
            Some(ReasonCode::EmptyQuery)
        );
        assert_eq!(
            validator.validate("SELECT FROM WHERE").reason(),
            Some(ReasonCode::SyntaxError)
        );
    }
}

#[test]
fn test_explain_denylist_rejects_analyze_with_distinct_message() {
    let validator = QueryValidator::for_database(DatabaseType::PostgreSQL, Denylist::for_explain());
    let base = QueryValidator::for_database(DatabaseType::PostgreSQL, Denylist::base());
    let sql = "SELECT id FROM users WHERE status = 'analyze'";

    assert!(base.validate(sql).is_accepted());
    let ValidationVerdict::Rejected(rejection) = validator.validate(sql) else {
        panic!("analyze must be rejected by the explain tools");
    };
    assert_eq!(rejection.reason, ReasonCode::DeniedKeyword);
    assert!(rejection.message.contains("analyze"));
}

#[test]
fn test_nested_select_is_accepted() {
    for validator in validators() {
        let verdict = validator.validate(
            "SELECT u.id, (SELECT count(*) FROM orders o WHERE o.user_id = u.id) AS n \
             FROM (SELECT id FROM users) u",
        );
        assert!(verdict.is_accepted(), "{:?}", verdict);
    }
}

#[test]
fn test_cte_is_accepted() {
    let validator = QueryValidator::for_database(DatabaseType::PostgreSQL, Denylist::base());
    let verdict =
        validator.validate("WITH recent AS (SELECT id FROM orders) SELECT count(*) FROM recent");
    assert!(verdict.is_accepted(), "{:?}", verdict);
}

#[test]
fn test_keyword_inside_identifier_is_rejected() {
    for validator in validators() {
        assert_eq!(
            validator.validate("SELECT updated_at FROM users").reason(),
            Some(ReasonCode::DeniedKeyword)
        );
    }
}

#[test]
fn test_trailing_separator_is_normalized_away() {
    for validator in validators() {
        let ValidationVerdict::Accepted(query) = validator.validate("SELECT id FROM users;") else {
            panic!("single statement with a trailing separator must be accepted");
        };
        assert_eq!(query.as_str(), "SELECT id FROM users");
    }
}

#[test]
fn test_fuzz_random_selects_are_accepted() {
    let mut rng = rand::thread_rng();
    for validator in validators() {
        for _ in 0..200 {
            let sql = random_select(&mut rng);
            let verdict = validator.validate(&sql);
            assert!(verdict.is_accepted(), "{} -> {:?}", sql, verdict);
        }
    }
}

#[test]
fn test_fuzz_joined_selects_are_rejected() {
    let mut rng = rand::thread_rng();
    for validator in validators() {
        for _ in 0..200 {
            let sql = format!("{}; {}", random_select(&mut rng), random_select(&mut rng));
            assert_eq!(
                validator.validate(&sql).reason(),
                Some(ReasonCode::MultipleStatements),
                "{}",
                sql
            );
        }
    }
}

#[test]
fn test_fuzz_garbage_never_panics() {
    let mut rng = rand::thread_rng();
    for validator in validators() {
        for _ in 0..500 {
            let input = random_garbage(&mut rng);
            // Accepting garbage is only possible if it happens to be a SELECT.
            if let ValidationVerdict::Accepted(query) = validator.validate(&input) {
                assert!(!query.as_str().is_empty());
            }
        }
    }
}

#[test]
fn test_edge_case_inputs_are_rejected() {
    let inputs = [
        "",
        "\n\r\t",
        "'OR 1=1--",
        "'; DROP TABLE users--",
        "1' UNION SELECT NULL, NULL--",
        "SHOW search_path",
        "SET search_path TO evil",
        "VACUUM users",
    ];
    for validator in validators() {
        for input in inputs {
            assert!(
                !validator.validate(input).is_accepted(),
                "{:?} was accepted",
                input
            );
        }
    }
}
