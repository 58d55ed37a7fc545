//! Checkout command.

use aurora_core::checkout::{Coupon, PaymentProvider, ShippingMethod};
use aurora_storefront::AppState;
use aurora_storefront::checkout::CheckoutRequest;
use aurora_storefront::error::AppError;

#[allow(clippy::print_stdout)]
pub async fn start(
    state: &AppState,
    email: Option<String>,
    name: Option<String>,
    shipping: ShippingMethod,
    coupon: Option<String>,
    provider: PaymentProvider,
) -> Result<(), AppError> {
    let session = state.session().current();
    let email = email
        .or_else(|| session.as_ref().and_then(|s| s.email.clone()))
        .unwrap_or_default();
    let name = name.or_else(|| session.and_then(|s| s.display_name));
    let applied = coupon.as_deref().and_then(|code| Coupon::parse(code).ok());

    let outcome = state
        .checkout()
        .start(&CheckoutRequest {
            shipping,
            coupon,
            email,
            name,
            provider,
        })
        .await?;

    let summary = &outcome.summary;
    println!("Subtotal  {:>10}", summary.subtotal.to_string());
    println!("Shipping  {:>10}  {}", summary.shipping.to_string(), shipping.title());
    if let Some(applied) = &applied {
        println!(
            "Discount  {:>10}  {} ({}%)",
            format!("-{}", summary.discount),
            applied.code,
            applied.percent()
        );
    }
    println!("Total     {:>10}", summary.total.to_string());
    if let Some(order) = &outcome.order {
        println!("Order #{} recorded as {}", order.id, order.status);
    }
    let provider = outcome.session.provider;
    println!("Pay with {}:", provider.display_name());
    for method in provider.payment_methods() {
        println!("  - {}: {}", method.name, method.description);
    }
    println!("{}", outcome.session.payment_url);
    Ok(())
}
