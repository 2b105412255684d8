//! Protocol methods

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// A wallet-control protocol method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    GetBalance,
    GetInfo,
    PayInvoice,
    MakeInvoice,
    LookupInvoice,
    ListTransactions,
}

impl Method {
    pub const ALL: [Method; 6] = [
        Method::GetBalance,
        Method::GetInfo,
        Method::PayInvoice,
        Method::MakeInvoice,
        Method::LookupInvoice,
        Method::ListTransactions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetBalance => "get_balance",
            Self::GetInfo => "get_info",
            Self::PayInvoice => "pay_invoice",
            Self::MakeInvoice => "make_invoice",
            Self::LookupInvoice => "lookup_invoice",
            Self::ListTransactions => "list_transactions",
        }
    }

    /// The spend-side method whose budget a read reports against.
    ///
    /// A balance query discloses how much the application's payment grant
    /// still allows, not a budget of its own. Methods that are not budgeted
    /// reads return `None`.
    pub fn budget_source(&self) -> Option<Method> {
        match self {
            Self::GetBalance => Some(Self::PayInvoice),
            Self::GetInfo
            | Self::PayInvoice
            | Self::MakeInvoice
            | Self::LookupInvoice
            | Self::ListTransactions => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| TypesError::UnknownMethod {
                method: s.to_string(),
            })
    }
}
