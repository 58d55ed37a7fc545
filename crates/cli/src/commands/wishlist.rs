//! Wishlist commands. All of them need a signed-in user.

use aurora_core::ProductId;
use aurora_storefront::AppState;
use aurora_storefront::error::AppError;

use super::catalog::product_row;

fn require_session(state: &AppState) -> Result<(), AppError> {
    state
        .session()
        .current()
        .map(|_| ())
        .ok_or(AppError::NotAuthenticated)
}

#[allow(clippy::print_stdout)]
pub fn show(state: &AppState) -> Result<(), AppError> {
    require_session(state)?;
    let entries = state.wishlist().entries();
    if entries.is_empty() {
        println!("No favorites yet.");
        return Ok(());
    }
    for entry in entries {
        let bell = if entry.notify_on_restock { "  [notify]" } else { "" };
        match state.catalog().get(entry.product_id) {
            Some(product) => println!("{}{bell}", product_row(product)),
            None => println!("{:>4}  (no longer in catalog){bell}", entry.product_id),
        }
    }
    Ok(())
}

pub async fn add(state: &AppState, product_id: ProductId, notify: bool) -> Result<(), AppError> {
    if state.catalog().get(product_id).is_none() {
        return Err(AppError::NotFound(format!("Product {product_id}")));
    }
    state.wishlist().add_item(product_id, notify).await?;
    Ok(())
}

pub async fn remove(state: &AppState, product_id: ProductId) -> Result<(), AppError> {
    require_session(state)?;
    let id = state
        .wishlist()
        .entry_id(product_id)
        .ok_or_else(|| AppError::NotFound(format!("Favorite {product_id}")))?;
    state.wishlist().remove_item(id).await?;
    Ok(())
}

pub async fn notify(
    state: &AppState,
    product_id: ProductId,
    enabled: bool,
) -> Result<(), AppError> {
    require_session(state)?;
    let id = state
        .wishlist()
        .entry_id(product_id)
        .ok_or_else(|| AppError::NotFound(format!("Favorite {product_id}")))?;
    state.wishlist().toggle_notification(id, enabled).await?;
    Ok(())
}
