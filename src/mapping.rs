//! Semantic column roles and the heuristic that suggests them.

use std::fmt;

use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{dataset::RawTable, insights::InsightError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Date,
    Amount,
    OrderId,
    CustomerId,
    Product,
    Channel,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Date,
        Role::Amount,
        Role::OrderId,
        Role::CustomerId,
        Role::Product,
        Role::Channel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Date => "date",
            Role::Amount => "amount",
            Role::OrderId => "order_id",
            Role::CustomerId => "customer_id",
            Role::Product => "product",
            Role::Channel => "channel",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Date => "Date",
            Role::Amount => "Amount / Revenue",
            Role::OrderId => "Order ID / Invoice",
            Role::CustomerId => "Customer ID",
            Role::Product => "Product / SKU",
            Role::Channel => "Channel / Source",
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Role::Date => &["date", "order_date", "timestamp"],
            Role::Amount => &["amount", "revenue", "sales", "price", "total"],
            Role::OrderId => &["order_id", "invoice", "transaction"],
            Role::CustomerId => &["customer", "cust_id", "client"],
            Role::Product => &["product", "sku", "item"],
            Role::Channel => &["channel", "source", "platform"],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Industry preset chosen alongside the dataset. Mapping suggestion accepts it
/// as a hint only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[value(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Industry {
    #[default]
    Generic,
    Retail,
    Saas,
    Marketplace,
}

impl Industry {
    /// Lenient lookup; unknown labels fall back to [`Industry::Generic`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "retail" => Industry::Retail,
            "saas" => Industry::Saas,
            "marketplace" => Industry::Marketplace,
            _ => Industry::Generic,
        }
    }
}

/// Which raw column plays each semantic role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub date: Option<String>,
    pub amount: Option<String>,
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    pub product: Option<String>,
    pub channel: Option<String>,
}

impl ColumnMapping {
    pub fn get(&self, role: Role) -> Option<&str> {
        match role {
            Role::Date => self.date.as_deref(),
            Role::Amount => self.amount.as_deref(),
            Role::OrderId => self.order_id.as_deref(),
            Role::CustomerId => self.customer_id.as_deref(),
            Role::Product => self.product.as_deref(),
            Role::Channel => self.channel.as_deref(),
        }
    }

    fn slot(&mut self, role: Role) -> &mut Option<String> {
        match role {
            Role::Date => &mut self.date,
            Role::Amount => &mut self.amount,
            Role::OrderId => &mut self.order_id,
            Role::CustomerId => &mut self.customer_id,
            Role::Product => &mut self.product,
            Role::Channel => &mut self.channel,
        }
    }

    /// Returns a copy with `role` reassigned (or cleared with `None`).
    #[must_use]
    pub fn with(mut self, role: Role, column: Option<String>) -> Self {
        *self.slot(role) = column;
        self
    }

    /// Index of the column mapped to `role`, if it is mapped and present.
    pub fn resolve(&self, table: &RawTable, role: Role) -> Option<usize> {
        self.get(role).and_then(|name| table.column_index(name))
    }

    /// Resolves every role in `roles`, or reports `message` if any is unmapped
    /// or absent from the table.
    pub fn require<const N: usize>(
        &self,
        table: &RawTable,
        roles: [Role; N],
        message: &'static str,
    ) -> Result<[usize; N], InsightError> {
        let mut indices = [0usize; N];
        for (slot, role) in indices.iter_mut().zip(roles) {
            *slot = self
                .resolve(table, role)
                .ok_or(InsightError::MissingFields(message))?;
        }
        Ok(indices)
    }

    /// Mapped roles whose column does not exist in `table`.
    pub fn dangling(&self, table: &RawTable) -> Vec<(Role, String)> {
        Role::ALL
            .into_iter()
            .filter_map(|role| {
                self.get(role)
                    .filter(|name| !table.has_column(name))
                    .map(|name| (role, name.to_string()))
            })
            .collect()
    }
}

/// Guesses a mapping from column names: for each role, the first column (in
/// table order) whose lowercase name contains one of the role's keywords.
pub fn suggest_mapping<S: AsRef<str>>(columns: &[S], industry: Industry) -> ColumnMapping {
    debug!("Suggesting column mapping for {industry:?} dataset");
    let lowered: Vec<String> = columns
        .iter()
        .map(|c| c.as_ref().to_lowercase())
        .collect();
    Role::ALL
        .into_iter()
        .fold(ColumnMapping::default(), |mapping, role| {
            let found = lowered
                .iter()
                .position(|name| role.keywords().iter().any(|k| name.contains(k)))
                .map(|idx| columns[idx].as_ref().to_string());
            mapping.with(role, found)
        })
}
