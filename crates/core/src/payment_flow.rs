//! Payment flow decision table.
//!
//! Which payments-platform operations a checkout performs depends only on
//! three facts about the caller and the order. [`PaymentFlow::select`] is the
//! whole decision; the network calls for each branch live in the storefront.
//!
//! | authenticated | recurring | stored method | flow |
//! |---|---|---|---|
//! | no  | no  | -   | [`PaymentFlow::GuestOneTime`] |
//! | yes | no  | no  | [`PaymentFlow::SignedInOneTime`] |
//! | yes | no  | yes | [`PaymentFlow::SignedInOneTimeSavedMethod`] |
//! | yes | yes | no  | [`PaymentFlow::NewSubscription`] |
//! | yes | yes | yes | [`PaymentFlow::SubscriptionSavedMethod`] |

use core::fmt;

use serde::{Deserialize, Serialize};

/// Flow selection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// Recurring orders need an account to attach the saved card to.
    #[error("recurring orders require a signed-in customer")]
    RecurringRequiresAccount,
}

/// One branch of the checkout decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFlow {
    /// Payment intent with manual (later) capture, customer found by email.
    GuestOneTime,
    /// Payment intent on the account's customer; card entered client-side.
    SignedInOneTime,
    /// Payment intent updated with a stored card and confirmed server-side.
    SignedInOneTimeSavedMethod,
    /// Setup intent for future off-session charges; card entered client-side.
    NewSubscription,
    /// Setup intent updated with a stored card and confirmed server-side.
    SubscriptionSavedMethod,
}

impl PaymentFlow {
    /// Pick the flow for a checkout.
    ///
    /// `has_stored_method` is ignored for guests.
    ///
    /// # Errors
    ///
    /// [`FlowError::RecurringRequiresAccount`] for an unauthenticated
    /// recurring order. Draft assembly rejects that case first, so reaching
    /// it here indicates a caller bug.
    pub const fn select(
        authenticated: bool,
        is_recurring: bool,
        has_stored_method: bool,
    ) -> Result<Self, FlowError> {
        match (authenticated, is_recurring, has_stored_method) {
            (false, true, _) => Err(FlowError::RecurringRequiresAccount),
            (false, false, _) => Ok(Self::GuestOneTime),
            (true, false, false) => Ok(Self::SignedInOneTime),
            (true, false, true) => Ok(Self::SignedInOneTimeSavedMethod),
            (true, true, false) => Ok(Self::NewSubscription),
            (true, true, true) => Ok(Self::SubscriptionSavedMethod),
        }
    }

    /// Whether the flow creates a setup intent rather than a payment intent.
    #[must_use]
    pub const fn uses_setup_intent(self) -> bool {
        matches!(self, Self::NewSubscription | Self::SubscriptionSavedMethod)
    }

    /// Whether the server attaches a stored card and confirms without the
    /// client entering card details.
    #[must_use]
    pub const fn confirms_server_side(self) -> bool {
        matches!(
            self,
            Self::SignedInOneTimeSavedMethod | Self::SubscriptionSavedMethod
        )
    }

    /// Whether the payment intent is authorized now and captured later.
    #[must_use]
    pub const fn captures_manually(self) -> bool {
        matches!(self, Self::GuestOneTime)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GuestOneTime => "guest_one_time",
            Self::SignedInOneTime => "signed_in_one_time",
            Self::SignedInOneTimeSavedMethod => "signed_in_one_time_saved_method",
            Self::NewSubscription => "new_subscription",
            Self::SubscriptionSavedMethod => "subscription_saved_method",
        }
    }
}

impl fmt::Display for PaymentFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported by the payments platform for a payment or setup intent.
///
/// Unrecognized statuses are kept verbatim so they can be shown to the
/// customer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    Other(String),
}

impl IntentStatus {
    /// Success for a payment intent: paid, or authorized awaiting capture.
    #[must_use]
    pub const fn is_payment_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::RequiresCapture)
    }

    /// Success for a setup intent. There is nothing to capture, so only
    /// `succeeded` counts.
    #[must_use]
    pub const fn is_setup_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Platform string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for IntentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "processing" => Self::Processing,
            "requires_capture" => Self::RequiresCapture,
            "canceled" => Self::Canceled,
            "succeeded" => Self::Succeeded,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for IntentStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<IntentStatus> for String {
    fn from(status: IntentStatus) -> Self {
        match status {
            IntentStatus::Other(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
