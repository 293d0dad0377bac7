//! Setup of a category-targeted run.

use tracing::{info, instrument, warn};

use imagesuggest_core::{CategoryExpander, CategoryTarget, Error, Result, UserRepository};

/// Resolve the named users and expand the categories of a targeted run.
///
/// Every user name must exist. When expansion fails, or no expander is
/// configured, the run is limited to the given categories only.
#[instrument(
    skip(users, expander, user_names, categories),
    fields(subsystem = "jobs", component = "category", op = "prepare_target")
)]
pub async fn prepare_category_target(
    users: &dyn UserRepository,
    expander: Option<&dyn CategoryExpander>,
    user_names: &[String],
    categories: &[String],
) -> Result<CategoryTarget> {
    if user_names.is_empty() {
        return Err(Error::InvalidInput("At least one user is required".to_string()));
    }
    let roots: Vec<String> = categories
        .iter()
        .map(|c| c.trim().replace('_', " "))
        .filter(|c| !c.is_empty())
        .collect();
    if roots.is_empty() {
        return Err(Error::InvalidInput("At least one category is required".to_string()));
    }

    let mut user_ids = Vec::with_capacity(user_names.len());
    for name in user_names {
        let user = users
            .user_by_name(name)
            .await?
            .ok_or_else(|| Error::UserNotFound(name.clone()))?;
        if !user_ids.contains(&user.id) {
            user_ids.push(user.id);
        }
    }

    let categories = match expander {
        Some(expander) => match expander.expand(&roots).await {
            Ok(expanded) => expanded,
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to expand with subcategories, moving forward with only the categories provided"
                );
                roots
            }
        },
        None => roots,
    };

    info!(
        user_count = user_ids.len(),
        category_count = categories.len(),
        "Category run prepared"
    );
    Ok(CategoryTarget {
        categories,
        user_ids,
    })
}
