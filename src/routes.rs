//! HTTP handlers for menus and ratings.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::AuthUser,
    error::AppError,
    menu::{self, Meal, MenuSnapshot},
    ratings::{self, AggregateStats, Scope, SubmitOutcome},
    state::AppState,
};

pub async fn health_handler() -> &'static str {
    "ok"
}

/// `GET /api/menus` — scrape whatever meal the page shows by default.
pub async fn menus_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MenuSnapshot>, AppError> {
    let snapshot = menu::scrape_menus(&state.config, None).await?;
    Ok(Json(snapshot))
}

/// `GET /api/menus/{meal}` — the meal name is validated before any browser
/// work happens.
pub async fn meal_menus_handler(
    State(state): State<Arc<AppState>>,
    Path(meal): Path<String>,
) -> Result<Json<MenuSnapshot>, AppError> {
    let meal: Meal = meal.parse()?;
    let snapshot = menu::scrape_menus(&state.config, Some(meal)).await?;
    Ok(Json(snapshot))
}

#[derive(Deserialize)]
pub struct RatingPayload {
    hall: Option<String>,
    meal: Option<String>,
    rating: Option<i64>,
    date: Option<String>,
}

/// `POST /api/ratings` — insert or overwrite the caller's rating for the
/// scope and return the recomputed aggregate.
pub async fn submit_rating_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<RatingPayload>,
) -> Result<Json<SubmitOutcome>, AppError> {
    let (Some(hall), Some(meal), Some(rating), Some(date)) =
        (payload.hall, payload.meal, payload.rating, payload.date)
    else {
        return Err(AppError::Validation(
            "Hall, meal, and rating required".to_string(),
        ));
    };

    let scope = Scope::new(&hall, &meal, &date)?;
    let outcome = ratings::submit(&state.db, user.id, &scope, rating).await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
pub struct ScopeQuery {
    hall: Option<String>,
    meal: Option<String>,
    date: Option<String>,
}

impl ScopeQuery {
    fn into_scope(self) -> Result<Scope, AppError> {
        let (Some(hall), Some(meal), Some(date)) = (self.hall, self.meal, self.date) else {
            return Err(AppError::Validation(
                "Hall, meal, and date required".to_string(),
            ));
        };
        Scope::new(&hall, &meal, &date)
    }
}

/// `GET /api/ratings/user?hall=&meal=&date=` — the caller's own rating, null
/// when they have not rated the scope yet.
pub async fn user_rating_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Value>, AppError> {
    let scope = query.into_scope()?;
    let rating = ratings::user_rating(&state.db, user.id, &scope).await?;
    Ok(Json(json!({ "userRating": rating })))
}

/// `GET /api/ratings/{hall}/{meal}/{date}` — every rating value in the scope,
/// highest first, with no user attribution.
pub async fn scope_ratings_handler(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path((hall, meal, date)): Path<(String, String, String)>,
) -> Result<Json<Value>, AppError> {
    let scope = Scope::new(&hall, &meal, &date)?;
    let values = ratings::list(&state.db, &scope).await?;
    Ok(Json(json!({ "ratings": values })))
}

#[derive(Deserialize)]
pub struct DateQuery {
    date: Option<String>,
}

/// `GET /api/ratings/{hall}/{meal}?date=` — the scope aggregate; an unrated
/// scope answers with zeroes.
pub async fn aggregate_handler(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path((hall, meal)): Path<(String, String)>,
    Query(query): Query<DateQuery>,
) -> Result<Json<AggregateStats>, AppError> {
    let Some(date) = query.date else {
        return Err(AppError::Validation("Date required".to_string()));
    };

    let scope = Scope::new(&hall, &meal, &date)?;
    let stats = ratings::aggregate(&state.db, &scope).await?;
    Ok(Json(stats))
}
