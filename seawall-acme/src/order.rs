//! ACME Orders data and identifiers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::Request;
use crate::Error;

/// Status of an [`Order`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// This is not part of the ACME API, but a temporary marker for us until the ACME provider
    /// tells us the order's real status.
    #[serde(rename = "<invalid>")]
    New,

    /// The order failed or expired.
    Invalid,

    /// The order is waiting for its authorizations to be completed.
    Pending,

    /// All authorizations are valid, the order waits for the client to finalize it.
    Ready,

    /// The certificate is being issued, the order should be polled.
    Processing,

    /// The certificate has been issued and can be downloaded.
    Valid,

    /// A status unknown to this client, tolerated for forward compatibility.
    #[serde(other, rename = "<unknown>")]
    Unknown,
}

impl Status {
    /// Create a new instance with state New.
    #[inline]
    pub fn new() -> Self {
        Status::New
    }

    /// Return true if state is New
    #[inline]
    pub fn is_new(&self) -> bool {
        *self == Status::New
    }

    /// Convenience method to check if the status is 'pending'.
    #[inline]
    pub fn is_pending(self) -> bool {
        self == Status::Pending
    }

    /// Convenience method to check if the status is 'ready'.
    #[inline]
    pub fn is_ready(self) -> bool {
        self == Status::Ready
    }

    /// Convenience method to check if the status is 'processing'.
    #[inline]
    pub fn is_processing(self) -> bool {
        self == Status::Processing
    }

    /// Convenience method to check if the status is 'valid'.
    #[inline]
    pub fn is_valid(self) -> bool {
        self == Status::Valid
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::new()
    }
}

/// An identifier used in orders and authorizations.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Identifier {
    /// A DNS name.
    Dns(String),
}

/// The ACME Order object with the client-side data required to create it and the server-provided
/// state after creation.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    /// The order status.
    #[serde(skip_serializing_if = "Status::is_new", default)]
    pub status: Status,

    /// The expiration date for this order, provided by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    /// List of identifiers (usually DNS names) this order covers.
    pub identifiers: Vec<Identifier>,

    /// Optional requested notBefore field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,

    /// Optional requested notAfter field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,

    /// The error problem document, filled in by the server for failed orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,

    /// URLs to this order's authorizations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorizations: Vec<String>,

    /// URL the CSR has to be posted to in order to complete the order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalize: Option<String>,

    /// URL to download the issued certificate chain from once the order is valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    /// Stores unknown fields if there are any.
    #[serde(flatten, default, skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub extra: std::collections::HashMap<String, Value>,
}

impl OrderData {
    /// Initialize an empty order object.
    pub fn new() -> Self {
        Default::default()
    }

    /// Builder-style method to add a domain identifier to the order.
    pub fn domain(mut self, domain: String) -> Self {
        self.identifiers.push(Identifier::Dns(domain));
        self
    }
}

/// An Order, created via [`Account::new_order`](crate::Account::new_order()), consisting of its
/// location URL and the server-provided order data.
#[derive(Clone, Debug)]
pub struct Order {
    /// Order location URL.
    pub location: String,

    /// The order's data object.
    pub data: OrderData,
}

impl Order {
    /// Get an authorization URL (or `None` if the index is out of range).
    pub fn authorization(&self, index: usize) -> Option<&str> {
        self.data.authorizations.get(index).map(String::as_str)
    }

    /// Get the number of authorizations in this object.
    pub fn authorization_len(&self) -> usize {
        self.data.authorizations.len()
    }
}

/// Represents an in-flight order creation request.
///
/// This is created via [`Account::new_order`](crate::Account::new_order()).
pub struct NewOrder {
    /// The request to send to the ACME provider. This is wrapped in an option in order to allow
    /// moving it out instead of copying the contents.
    ///
    /// When created via [`Account::new_order`](crate::Account::new_order()) this is guaranteed to
    /// be `Some`.
    ///
    /// The response should be passed to the [`response`](NewOrder::response()) method.
    pub request: Option<Request>,
}

impl NewOrder {
    pub(crate) fn new(request: Request) -> Self {
        Self {
            request: Some(request),
        }
    }

    /// Deal with the response we got from the server.
    pub fn response(self, location_header: String, response_body: &[u8]) -> Result<Order, Error> {
        Ok(Order {
            location: location_header,
            data: serde_json::from_slice(response_body)
                .map_err(|err| Error::BadOrderData(err.to_string()))?,
        })
    }
}
