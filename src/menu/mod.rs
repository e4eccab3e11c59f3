//! Menu scraping pipeline.
//!
//! One scrape request owns one headless browser session: navigate to the
//! dining page, optionally click a meal tab, wait for both hall containers to
//! stabilize, then hand each container's HTML to the pure extractor. The
//! session is torn down on every exit path. Either both halls parse or the
//! whole request fails; there is no partial result.

use std::{str::FromStr, time::Duration};

use serde::Serialize;
use tracing::info;

use crate::{config::Config, error::AppError};

pub mod browser;
pub mod extract;

use browser::BrowserSession;

/// Bounded wait for the hall containers after navigation or a meal click.
pub const STABILIZATION_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on page navigation itself.
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hall {
    Thorne,
    Moulton,
}

impl Hall {
    /// CSS selector of the hall's menu widget on the dining page.
    pub fn container_selector(self) -> &'static str {
        match self {
            Hall::Thorne => "#u49",
            Hall::Moulton => "#u48",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meal {
    Breakfast,
    Brunch,
    Lunch,
    Dinner,
}

impl Meal {
    /// Position of the meal's tab on the dining page.
    fn tab_index(self) -> usize {
        match self {
            Meal::Breakfast => 0,
            Meal::Brunch => 1,
            Meal::Lunch => 2,
            Meal::Dinner => 3,
        }
    }

    /// Selector of the anchor that switches the page to this meal.
    pub fn control_selector(self) -> String {
        format!("a[href='#{}']", self.tab_index())
    }
}

impl FromStr for Meal {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Breakfast" => Ok(Meal::Breakfast),
            "Brunch" => Ok(Meal::Brunch),
            "Lunch" => Ok(Meal::Lunch),
            "Dinner" => Ok(Meal::Dinner),
            other => Err(AppError::InvalidMeal(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuSection {
    pub category: String,
    pub items: Vec<String>,
}

impl MenuSection {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            items: Vec::new(),
        }
    }
}

/// Per-request scrape result, never persisted.
#[derive(Debug, Serialize)]
pub struct MenuSnapshot {
    #[serde(rename = "Thorne")]
    pub thorne: Vec<MenuSection>,
    #[serde(rename = "Moulton")]
    pub moulton: Vec<MenuSection>,
}

/// Scrapes both halls, optionally selecting a meal tab first. Runs the whole
/// navigate → select → wait → extract sequence on a blocking thread since the
/// browser client is synchronous.
pub async fn scrape_menus(config: &Config, meal: Option<Meal>) -> Result<MenuSnapshot, AppError> {
    let url = config.menu_url.clone();

    tokio::task::spawn_blocking(move || scrape_blocking(&url, meal))
        .await
        .map_err(|e| AppError::Browser(format!("scrape task panicked: {e}")))?
}

fn scrape_blocking(url: &str, meal: Option<Meal>) -> Result<MenuSnapshot, AppError> {
    let session = BrowserSession::open(url, NAVIGATION_TIMEOUT)?;

    if let Some(meal) = meal {
        info!("Selecting meal tab {meal:?}");
        session.click(&meal.control_selector())?;
    }

    let containers = [
        Hall::Thorne.container_selector(),
        Hall::Moulton.container_selector(),
    ];
    session.wait_until_stable(&containers, STABILIZATION_TIMEOUT)?;

    let thorne = extract::sections(&session.container_html(Hall::Thorne.container_selector())?);
    let moulton = extract::sections(&session.container_html(Hall::Moulton.container_selector())?);

    Ok(MenuSnapshot { thorne, moulton })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_meals_parse() {
        assert_eq!("Breakfast".parse::<Meal>().unwrap(), Meal::Breakfast);
        assert_eq!("Dinner".parse::<Meal>().unwrap(), Meal::Dinner);
    }

    #[test]
    fn unknown_meal_is_rejected() {
        let err = "Snack".parse::<Meal>().unwrap_err();
        assert!(matches!(err, AppError::InvalidMeal(name) if name == "Snack"));
    }

    #[test]
    fn meal_names_are_case_sensitive() {
        assert!("lunch".parse::<Meal>().is_err());
    }

    #[test]
    fn meal_controls_map_to_page_tabs() {
        assert_eq!(Meal::Breakfast.control_selector(), "a[href='#0']");
        assert_eq!(Meal::Dinner.control_selector(), "a[href='#3']");
    }
}
