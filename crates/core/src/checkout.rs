//! Checkout pricing and order descriptions.
//!
//! Everything the payment provider needs to know about a purchase is computed
//! here from the cart contents: shipping cost, coupon discount, totals, and the
//! line-by-line order description.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::{LineItem, total_price};
use crate::types::Price;

/// Errors that can occur when pricing a checkout.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PricingError {
    /// The coupon code is not recognized.
    #[error("invalid coupon: {0}")]
    InvalidCoupon(String),

    /// Unknown shipping method name.
    #[error("unknown shipping method: {0}")]
    UnknownShippingMethod(String),

    /// Unknown payment provider name.
    #[error("unknown payment provider: {0}")]
    UnknownProvider(String),
}

/// Delivery option chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    #[default]
    Standard,
    Express,
    Pickup,
}

impl ShippingMethod {
    #[must_use]
    pub fn cost(self) -> Price {
        match self {
            Self::Standard => Price::from_cents(599),
            Self::Express => Price::from_cents(1299),
            Self::Pickup => Price::ZERO,
        }
    }

    /// Title of the shipping line sent to the payment provider.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Standard => "Standard shipping (5-7 days)",
            Self::Express => "Express shipping (2-3 days)",
            Self::Pickup => "Store pickup",
        }
    }
}

impl std::str::FromStr for ShippingMethod {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "express" => Ok(Self::Express),
            "pickup" => Ok(Self::Pickup),
            _ => Err(PricingError::UnknownShippingMethod(s.to_owned())),
        }
    }
}

/// A validated coupon code and its discount rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    /// Normalized (upper-case) code.
    pub code: String,
    /// Fraction of the subtotal taken off, e.g. 0.10.
    pub rate: Decimal,
}

const COUPONS: &[(&str, i64)] = &[("DESCUENTO10", 10), ("DESCUENTO20", 20), ("VERANO15", 15)];

impl Coupon {
    /// Look up a coupon code (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `PricingError::InvalidCoupon` if the code is not recognized.
    pub fn parse(code: &str) -> Result<Self, PricingError> {
        let normalized = code.trim().to_uppercase();
        COUPONS
            .iter()
            .find(|(known, _)| *known == normalized)
            .map(|(known, percent)| Self {
                code: (*known).to_owned(),
                rate: Decimal::new(*percent, 2),
            })
            .ok_or_else(|| PricingError::InvalidCoupon(code.to_owned()))
    }

    /// Whole-number percentage, for display.
    #[must_use]
    pub fn percent(&self) -> Decimal {
        (self.rate * Decimal::ONE_HUNDRED).normalize()
    }
}

/// Money breakdown of a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub subtotal: Price,
    pub shipping: Price,
    pub discount: Price,
    pub total: Price,
}

impl OrderSummary {
    /// `total = subtotal + shipping - subtotal * coupon rate`.
    #[must_use]
    pub fn compute(items: &[LineItem], shipping: ShippingMethod, coupon: Option<&Coupon>) -> Self {
        let subtotal = total_price(items);
        let shipping = shipping.cost();
        let discount = coupon.map_or(Price::ZERO, |c| subtotal.scale(c.rate));
        Self {
            subtotal,
            shipping,
            discount,
            total: subtotal + shipping - discount,
        }
    }
}

/// Payment providers the checkout service knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    #[default]
    MercadoPago,
    PayPal,
    Stripe,
}

/// A payment method offered by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentMethod {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

const MERCADOPAGO_METHODS: &[PaymentMethod] = &[
    PaymentMethod {
        id: "credit_card",
        name: "Credit cards",
        description: "Visa, Mastercard, American Express",
    },
    PaymentMethod {
        id: "debit_card",
        name: "Debit cards",
        description: "Visa Debit, Mastercard Debit",
    },
    PaymentMethod {
        id: "mercado_credito",
        name: "Mercado Credito",
        description: "Up to 12 installments without a card",
    },
    PaymentMethod {
        id: "efectivo",
        name: "Cash",
        description: "PagoFacil, Rapipago, Provincia NET",
    },
    PaymentMethod {
        id: "transferencia",
        name: "Bank transfer",
        description: "Instant transfer",
    },
    PaymentMethod {
        id: "mercado_pago",
        name: "Mercado Pago",
        description: "Account balance",
    },
];

const PAYPAL_METHODS: &[PaymentMethod] = &[
    PaymentMethod {
        id: "paypal",
        name: "PayPal",
        description: "Secure payment with PayPal",
    },
    PaymentMethod {
        id: "credit_card",
        name: "Cards",
        description: "Visa, Mastercard, Amex",
    },
];

const STRIPE_METHODS: &[PaymentMethod] = &[PaymentMethod {
    id: "credit_card",
    name: "Cards",
    description: "Visa, Mastercard, Amex",
}];

impl PaymentProvider {
    /// Providers currently offered at checkout.
    #[must_use]
    pub const fn available() -> &'static [Self] {
        &[Self::MercadoPago]
    }

    /// Path segment / wire name of the provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MercadoPago => "mercadopago",
            Self::PayPal => "paypal",
            Self::Stripe => "stripe",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::MercadoPago => "Mercado Pago",
            Self::PayPal => "PayPal",
            Self::Stripe => "Stripe",
        }
    }

    #[must_use]
    pub const fn payment_methods(self) -> &'static [PaymentMethod] {
        match self {
            Self::MercadoPago => MERCADOPAGO_METHODS,
            Self::PayPal => PAYPAL_METHODS,
            Self::Stripe => STRIPE_METHODS,
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentProvider {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mercadopago" => Ok(Self::MercadoPago),
            "paypal" => Ok(Self::PayPal),
            "stripe" => Ok(Self::Stripe),
            _ => Err(PricingError::UnknownProvider(s.to_owned())),
        }
    }
}

/// One billable line sent to the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: String,
    pub title: String,
    pub description: String,
    pub unit_price: Price,
    pub quantity: u32,
}

/// Everything the payment provider needs to create a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDescription {
    pub items: Vec<OrderLine>,
    pub shipping_method: ShippingMethod,
    pub shipping_cost: Price,
    pub discount: Price,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    pub customer_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
}

/// Id of the synthetic shipping line.
pub const SHIPPING_LINE_ID: &str = "shipping";

impl OrderDescription {
    /// Describe a cart for the payment provider.
    ///
    /// Adds a shipping line when the shipping cost is positive.
    #[must_use]
    pub fn from_cart(
        items: &[LineItem],
        summary: &OrderSummary,
        shipping_method: ShippingMethod,
        coupon: Option<&Coupon>,
        customer_email: &str,
        customer_name: Option<&str>,
    ) -> Self {
        let mut lines: Vec<OrderLine> = items
            .iter()
            .map(|item| OrderLine {
                id: item.id.to_string(),
                title: item.name.clone(),
                description: format!("Size: {} | Color: {}", item.size, item.color),
                unit_price: item.unit_price,
                quantity: item.quantity,
            })
            .collect();

        if summary.shipping.is_positive() {
            lines.push(OrderLine {
                id: SHIPPING_LINE_ID.to_owned(),
                title: shipping_method.title().to_owned(),
                description: "Shipping cost".to_owned(),
                unit_price: summary.shipping,
                quantity: 1,
            });
        }

        Self {
            items: lines,
            shipping_method,
            shipping_cost: summary.shipping,
            discount: summary.discount,
            coupon_code: coupon.map(|c| c.code.clone()),
            customer_email: customer_email.to_owned(),
            customer_name: customer_name.map(str::to_owned),
        }
    }
}
