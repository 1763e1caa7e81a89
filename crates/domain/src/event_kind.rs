use std::str::FromStr;

use pixelrelay_core::AppError;
use serde::{Deserialize, Serialize};

use crate::event::PayloadMap;

/// Internal event kinds the relay knows how to sanitize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A storefront page was viewed.
    PageView,
    /// A product detail page was viewed.
    ProductView,
    /// An item was added to the cart.
    AddToCart,
    /// Checkout was started.
    BeginCheckout,
    /// An order was paid.
    Purchase,
    /// A user account was created.
    SignUp,
}

impl EventKind {
    /// Returns a stable storage value for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::ProductView => "product_view",
            Self::AddToCart => "add_to_cart",
            Self::BeginCheckout => "begin_checkout",
            Self::Purchase => "purchase",
            Self::SignUp => "sign_up",
        }
    }

    /// Returns the payload fields that may leave the system for this kind.
    #[must_use]
    pub fn whitelist(&self) -> &'static [&'static str] {
        match self {
            Self::PageView => &["path", "title", "referrer"],
            Self::ProductView => &["productId", "productName", "category", "price", "currency"],
            Self::AddToCart => &["productId", "productName", "quantity", "price", "currency"],
            Self::BeginCheckout => &["cartId", "total", "currency", "itemCount"],
            Self::Purchase => &["orderId", "total", "currency"],
            Self::SignUp => &["method"],
        }
    }

    /// Returns all known kinds.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[EventKind] = &[
            EventKind::PageView,
            EventKind::ProductView,
            EventKind::AddToCart,
            EventKind::BeginCheckout,
            EventKind::Purchase,
            EventKind::SignUp,
        ];

        ALL
    }
}

impl FromStr for EventKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown event kind '{value}'")))
    }
}

/// Projects `payload` onto the whitelist configured for `event_kind`.
///
/// Unknown kinds yield an empty payload.
#[must_use]
pub fn sanitize_payload(event_kind: &str, payload: &PayloadMap) -> PayloadMap {
    let Ok(kind) = EventKind::from_str(event_kind) else {
        return PayloadMap::new();
    };

    kind.whitelist()
        .iter()
        .filter_map(|field| {
            payload
                .get(*field)
                .map(|value| ((*field).to_owned(), value.clone()))
        })
        .collect()
}
