//! Rating aggregation over the persisted store.
//!
//! A rating is scoped by (user, hall, meal, date); the aggregate is scoped by
//! (hall, meal, date) across all users. Submitting twice for the same scope
//! overwrites the earlier value, and every submit recomputes the aggregate.

use serde::Serialize;

use crate::{db::Database, error::AppError};

/// A (hall, meal, date) aggregation scope, validated on construction.
#[derive(Debug, Clone)]
pub struct Scope {
    pub hall: String,
    pub meal: String,
    pub date: String,
}

impl Scope {
    pub fn new(hall: &str, meal: &str, date: &str) -> Result<Self, AppError> {
        if hall.is_empty() || meal.is_empty() || date.is_empty() {
            return Err(AppError::Validation(
                "Hall, meal, and date required".to_string(),
            ));
        }

        if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            return Err(AppError::Validation(format!(
                "Date must be YYYY-MM-DD, got '{date}'"
            )));
        }

        Ok(Self {
            hall: hall.to_string(),
            meal: meal.to_string(),
            date: date.to_string(),
        })
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub avg_rating: f64,
    pub total_ratings: u64,
}

impl AggregateStats {
    pub const EMPTY: AggregateStats = AggregateStats {
        avg_rating: 0.0,
        total_ratings: 0,
    };
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub message: &'static str,
    pub avg_rating: f64,
    pub total_ratings: u64,
    pub updated: bool,
    pub user_rating: u8,
}

/// Writes the user's rating for the scope (insert or in-place overwrite) and
/// returns the freshly recomputed aggregate. Exactly one row is touched; the
/// store's single writer plus its unique index keep concurrent submissions
/// for the same tuple from producing duplicates.
pub async fn submit(
    db: &Database,
    user_id: i64,
    scope: &Scope,
    rating: i64,
) -> Result<SubmitOutcome, AppError> {
    let rating = validate_rating(rating)?;

    let updated = db
        .upsert_rating(
            user_id,
            scope.hall.clone(),
            scope.meal.clone(),
            rating,
            scope.date.clone(),
        )
        .await?;

    let stats = aggregate(db, scope).await?;

    Ok(SubmitOutcome {
        message: "Rating saved",
        avg_rating: stats.avg_rating,
        total_ratings: stats.total_ratings,
        updated,
        user_rating: rating,
    })
}

/// The caller's own rating for the scope, if any. "No rating yet" is a normal
/// answer, not an error.
pub async fn user_rating(
    db: &Database,
    user_id: i64,
    scope: &Scope,
) -> Result<Option<u8>, AppError> {
    let rating = db
        .user_rating(
            user_id,
            scope.hall.clone(),
            scope.meal.clone(),
            scope.date.clone(),
        )
        .await?;
    Ok(rating)
}

/// Average and count over every rating in the scope; an unrated scope yields
/// the zero-valued stats.
pub async fn aggregate(db: &Database, scope: &Scope) -> Result<AggregateStats, AppError> {
    let (avg, count) = db
        .scope_stats(scope.hall.clone(), scope.meal.clone(), scope.date.clone())
        .await?;

    Ok(match avg {
        Some(avg) => AggregateStats {
            avg_rating: round2(avg),
            total_ratings: count,
        },
        None => AggregateStats::EMPTY,
    })
}

/// All rating values in the scope, highest first, anonymized.
pub async fn list(db: &Database, scope: &Scope) -> Result<Vec<u8>, AppError> {
    let ratings = db
        .scope_ratings(scope.hall.clone(), scope.meal.clone(), scope.date.clone())
        .await?;
    Ok(ratings)
}

fn validate_rating(rating: i64) -> Result<u8, AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::Validation(format!(
            "Rating must be between 1 and 5, got {rating}"
        )));
    }
    Ok(rating as u8)
}

/// Round half-up to two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn db_with_users(names: &[&str]) -> (Database, Vec<i64>) {
        let db = Database::new(":memory:").expect("in-memory database");
        let mut ids = Vec::new();
        for name in names {
            let id = db
                .insert_user(
                    name.to_string(),
                    format!("{name}@example.edu"),
                    "hash".to_string(),
                )
                .await
                .expect("insert user");
            ids.push(id);
        }
        (db, ids)
    }

    fn lunch() -> Scope {
        Scope::new("Thorne", "Lunch", "2025-08-20").unwrap()
    }

    #[test]
    fn scope_rejects_blank_and_malformed_fields() {
        assert!(Scope::new("", "Lunch", "2025-08-20").is_err());
        assert!(Scope::new("Thorne", "", "2025-08-20").is_err());
        assert!(Scope::new("Thorne", "Lunch", "").is_err());
        assert!(Scope::new("Thorne", "Lunch", "08/20/2025").is_err());
        assert!(Scope::new("Thorne", "Lunch", "2025-08-20").is_ok());
    }

    #[tokio::test]
    async fn out_of_range_ratings_are_rejected() {
        let (db, ids) = db_with_users(&["alice"]).await;

        for bad in [0, 6, -1] {
            let err = submit(&db, ids[0], &lunch(), bad).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }

        // Nothing was written.
        assert_eq!(aggregate(&db, &lunch()).await.unwrap(), AggregateStats::EMPTY);
    }

    #[tokio::test]
    async fn resubmission_overwrites_in_place() {
        let (db, ids) = db_with_users(&["alice"]).await;

        let first = submit(&db, ids[0], &lunch(), 2).await.unwrap();
        assert!(!first.updated);
        assert_eq!(first.total_ratings, 1);
        assert_eq!(first.user_rating, 2);

        let second = submit(&db, ids[0], &lunch(), 4).await.unwrap();
        assert!(second.updated);
        assert_eq!(second.total_ratings, 1);
        assert_eq!(second.avg_rating, 4.0);
        assert_eq!(second.user_rating, 4);

        assert_eq!(list(&db, &lunch()).await.unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn aggregate_averages_across_users() {
        let (db, ids) = db_with_users(&["alice", "bob", "carol"]).await;

        for (id, rating) in ids.iter().zip([3, 4, 5]) {
            submit(&db, *id, &lunch(), rating).await.unwrap();
        }

        let stats = aggregate(&db, &lunch()).await.unwrap();
        assert_eq!(stats.avg_rating, 4.0);
        assert_eq!(stats.total_ratings, 3);
    }

    #[tokio::test]
    async fn average_rounds_half_up_to_two_places() {
        let (db, ids) = db_with_users(&["a", "b", "c"]).await;

        // 3 + 4 + 4 = 11/3 = 3.666... → 3.67
        for (id, rating) in ids.iter().zip([3, 4, 4]) {
            submit(&db, *id, &lunch(), rating).await.unwrap();
        }

        let stats = aggregate(&db, &lunch()).await.unwrap();
        assert_eq!(stats.avg_rating, 3.67);
    }

    #[tokio::test]
    async fn unrated_scope_yields_zero_stats() {
        let (db, _) = db_with_users(&[]).await;
        assert_eq!(aggregate(&db, &lunch()).await.unwrap(), AggregateStats::EMPTY);
        assert_eq!(list(&db, &lunch()).await.unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn listing_sorts_descending_without_identity() {
        let (db, ids) = db_with_users(&["alice", "bob", "carol"]).await;

        for (id, rating) in ids.iter().zip([2, 5, 3]) {
            submit(&db, *id, &lunch(), rating).await.unwrap();
        }

        assert_eq!(list(&db, &lunch()).await.unwrap(), vec![5, 3, 2]);
    }

    #[tokio::test]
    async fn scopes_do_not_bleed_into_each_other() {
        let (db, ids) = db_with_users(&["alice"]).await;
        let dinner = Scope::new("Thorne", "Dinner", "2025-08-20").unwrap();

        submit(&db, ids[0], &lunch(), 5).await.unwrap();
        submit(&db, ids[0], &dinner, 1).await.unwrap();

        assert_eq!(user_rating(&db, ids[0], &lunch()).await.unwrap(), Some(5));
        assert_eq!(user_rating(&db, ids[0], &dinner).await.unwrap(), Some(1));
        assert_eq!(aggregate(&db, &dinner).await.unwrap().avg_rating, 1.0);
    }

    #[tokio::test]
    async fn missing_user_rating_is_none_not_error() {
        let (db, ids) = db_with_users(&["alice"]).await;
        assert_eq!(user_rating(&db, ids[0], &lunch()).await.unwrap(), None);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round2(3.625), 3.63);
        assert_eq!(round2(3.664999), 3.66);
        assert_eq!(round2(4.0), 4.0);
    }
}
