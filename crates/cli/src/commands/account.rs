//! Session, profile and order history commands.

use aurora_storefront::AppState;
use aurora_storefront::error::AppError;
use aurora_storefront::remote::ProfileUpdate;
use aurora_storefront::session::Credentials;

#[allow(clippy::print_stdout)]
pub async fn login(state: &AppState, email: String, password: String) -> Result<(), AppError> {
    let session = state
        .session()
        .sign_in(&Credentials::new(email, password))
        .await?;
    // Cart merge and wishlist load run in the session listener
    state.settle().await;
    println!(
        "Signed in as {}",
        session.email.as_deref().unwrap_or(session.user_id.as_str())
    );
    Ok(())
}

pub async fn logout(state: &AppState) -> Result<(), AppError> {
    state.session().sign_out().await?;
    Ok(())
}

#[allow(clippy::print_stdout)]
pub fn whoami(state: &AppState) {
    match state.session().current() {
        Some(session) => {
            println!("{}", session.user_id);
            if let Some(email) = &session.email {
                println!("email: {email}");
            }
            if let Some(name) = &session.display_name {
                println!("name:  {name}");
            }
        }
        None => println!("Not signed in."),
    }
}

#[allow(clippy::print_stdout)]
pub fn profile(state: &AppState) -> Result<(), AppError> {
    if state.session().current().is_none() {
        return Err(AppError::NotAuthenticated);
    }
    let profile = state
        .profile()
        .current()
        .ok_or_else(|| AppError::NotFound("Profile".to_string()))?;
    println!("email: {}", profile.email);
    println!("name:  {}", profile.full_name.as_deref().unwrap_or("-"));
    println!("phone: {}", profile.phone.as_deref().unwrap_or("-"));
    Ok(())
}

pub async fn update_profile(
    state: &AppState,
    full_name: Option<String>,
    phone: Option<String>,
    avatar_url: Option<String>,
) -> Result<(), AppError> {
    state
        .profile()
        .update(&ProfileUpdate {
            full_name,
            phone,
            avatar_url,
        })
        .await?;
    Ok(())
}

#[allow(clippy::print_stdout)]
pub async fn orders(state: &AppState) -> Result<(), AppError> {
    let orders = state.orders().list().await?;
    if orders.is_empty() {
        println!("No orders yet.");
        return Ok(());
    }
    for order in orders {
        let placed = order
            .created_at
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "#{:<6} {:<10} {:>10}  {} items  {placed}",
            order.id,
            order.status.to_string(),
            order.total_amount.to_string(),
            order.items.iter().map(|line| line.quantity).sum::<u32>()
        );
    }
    Ok(())
}
