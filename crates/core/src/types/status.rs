//! Lifecycle statuses and delivery frequency.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
///
/// `Pending → Confirmed → Delivered`, or `Cancelled` from any non-delivered
/// state. Transitions after creation are performed by back-office processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Whether the order may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Confirmed | Self::Cancelled)
                | (Self::Confirmed, Self::Delivered | Self::Cancelled)
        )
    }

    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

/// Subscription lifecycle status.
///
/// `Active ⇄ Paused`; `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Paused,
    Cancelled,
}

impl SubscriptionStatus {
    /// Whether the subscription may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Paused | Self::Cancelled)
                | (Self::Paused, Self::Active | Self::Cancelled)
        )
    }

    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid subscription status: {s}")),
        }
    }
}

/// How often a recurring order is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    #[default]
    Weekly,
    BiWeekly,
    #[serde(alias = "monthly")]
    EveryFourWeeks,
}

impl Frequency {
    /// Days between deliveries.
    #[must_use]
    pub const fn step_days(self) -> i64 {
        match self {
            Self::Weekly => 7,
            Self::BiWeekly => 14,
            Self::EveryFourWeeks => 28,
        }
    }

    /// Stable string form used in storage and metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::BiWeekly => "bi-weekly",
            Self::EveryFourWeeks => "every-four-weeks",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Self::Weekly),
            "bi-weekly" => Ok(Self::BiWeekly),
            "every-four-weeks" | "monthly" => Ok(Self::EveryFourWeeks),
            _ => Err(format!("invalid frequency: {s}")),
        }
    }
}

/// Day of week numbered 0 (Sunday) through 6 (Saturday), as stored on
/// subscriptions and used in settings documents.
#[must_use]
pub fn weekday_number(day: chrono::Weekday) -> u8 {
    // num_days_from_sunday is at most 6
    #[allow(clippy::cast_possible_truncation)]
    let n = day.num_days_from_sunday() as u8;
    n
}

/// Inverse of [`weekday_number`]; `None` outside 0..=6.
#[must_use]
pub const fn weekday_from_number(n: u8) -> Option<chrono::Weekday> {
    use chrono::Weekday::{Fri, Mon, Sat, Sun, Thu, Tue, Wed};
    match n {
        0 => Some(Sun),
        1 => Some(Mon),
        2 => Some(Tue),
        3 => Some(Wed),
        4 => Some(Thu),
        5 => Some(Fri),
        6 => Some(Sat),
        _ => None,
    }
}
