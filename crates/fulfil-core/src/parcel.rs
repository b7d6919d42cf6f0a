//! # Parcels and Addresses
//!
//! Snapshots of what the user submitted. The order keeps its own copy so a
//! later edit of the user's address book never changes a shipped order.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Amount;

/// Heaviest parcel the carrier accepts, in grams.
pub const MAX_WEIGHT_GRAMS: u32 = 50_000;

/// Longest edge the carrier accepts, in centimetres.
pub const MAX_DIMENSION_CM: u32 = 300;

/// Postal address snapshot for a sender or recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Contact name.
    pub name: String,
    /// Contact phone, digits only.
    pub phone: String,
    /// Province.
    pub province: String,
    /// City or amphoe.
    pub city: String,
    /// District or tambon, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    /// 5-digit postal code.
    pub postal_code: String,
    /// Street address line.
    pub detail: String,
}

impl Address {
    /// Check required fields and formats. `role` prefixes field names in
    /// error messages (`"sender"` or `"recipient"`).
    pub fn validate(&self, role: Role) -> Result<(), ValidationError> {
        let f = |field: &'static str| role.field(field);
        non_empty(&self.name, f("name"))?;
        non_empty(&self.province, f("province"))?;
        non_empty(&self.city, f("city"))?;
        non_empty(&self.detail, f("detail"))?;

        if self.postal_code.len() != 5 || !self.postal_code.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidPostalCode {
                field: f("postal_code"),
                value: self.postal_code.clone(),
            });
        }
        let phone_ok = (9..=15).contains(&self.phone.len())
            && self.phone.chars().all(|c| c.is_ascii_digit());
        if !phone_ok {
            return Err(ValidationError::InvalidPhone {
                field: f("phone"),
                value: self.phone.clone(),
            });
        }
        Ok(())
    }
}

/// Which side of the shipment an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The party handing the parcel to the carrier.
    Sender,
    /// The party receiving the parcel.
    Recipient,
}

impl Role {
    fn field(self, name: &'static str) -> &'static str {
        match (self, name) {
            (Self::Sender, "name") => "sender.name",
            (Self::Sender, "province") => "sender.province",
            (Self::Sender, "city") => "sender.city",
            (Self::Sender, "detail") => "sender.detail",
            (Self::Sender, "postal_code") => "sender.postal_code",
            (Self::Sender, "phone") => "sender.phone",
            (Self::Recipient, "name") => "recipient.name",
            (Self::Recipient, "province") => "recipient.province",
            (Self::Recipient, "city") => "recipient.city",
            (Self::Recipient, "detail") => "recipient.detail",
            (Self::Recipient, "postal_code") => "recipient.postal_code",
            (Self::Recipient, "phone") => "recipient.phone",
            (_, other) => other,
        }
    }
}

/// Physical attributes of a parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parcel {
    /// Weight in grams.
    pub weight_grams: u32,
    /// Length in centimetres.
    pub length_cm: u32,
    /// Width in centimetres.
    pub width_cm: u32,
    /// Height in centimetres.
    pub height_cm: u32,
}

impl Parcel {
    /// Check weight and dimensions against carrier limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.weight_grams == 0 || self.weight_grams > MAX_WEIGHT_GRAMS {
            return Err(ValidationError::InvalidWeight {
                grams: self.weight_grams,
                max: MAX_WEIGHT_GRAMS,
            });
        }
        for (field, value) in [
            ("length_cm", self.length_cm),
            ("width_cm", self.width_cm),
            ("height_cm", self.height_cm),
        ] {
            if value == 0 || value > MAX_DIMENSION_CM {
                return Err(ValidationError::InvalidDimension {
                    field,
                    value,
                    max: MAX_DIMENSION_CM,
                });
            }
        }
        Ok(())
    }
}

/// Cash-on-delivery instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodInfo {
    /// Whether the carrier collects payment from the recipient.
    pub enabled: bool,
    /// Amount to collect, in minor units. Ignored when `enabled` is false.
    #[serde(default)]
    pub amount: Amount,
}

impl CodInfo {
    /// No cash on delivery.
    pub const NONE: Self = Self {
        enabled: false,
        amount: Amount::ZERO,
    };

    /// Collect `amount` from the recipient.
    pub fn collect(amount: Amount) -> Self {
        Self {
            enabled: true,
            amount,
        }
    }

    /// The amount that drives the COD surcharge: zero unless enabled.
    pub fn chargeable_amount(&self) -> Amount {
        if self.enabled {
            self.amount
        } else {
            Amount::ZERO
        }
    }

    /// COD must carry a positive amount when enabled.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && !self.amount.is_positive() {
            return Err(ValidationError::InvalidAmount {
                field: "cod.amount",
                value: self.amount.minor(),
            });
        }
        if self.amount.is_negative() {
            return Err(ValidationError::InvalidAmount {
                field: "cod.amount",
                value: self.amount.minor(),
            });
        }
        Ok(())
    }
}

pub(crate) fn non_empty(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField { field })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address {
            name: "Somchai".to_string(),
            phone: "0812345678".to_string(),
            province: "Bangkok".to_string(),
            city: "Chatuchak".to_string(),
            district: None,
            postal_code: "10900".to_string(),
            detail: "99/1 Phahonyothin Rd".to_string(),
        }
    }

    #[test]
    fn valid_address_passes() {
        assert!(address().validate(Role::Sender).is_ok());
    }

    #[test]
    fn short_postal_code_rejected_with_role_prefix() {
        let mut a = address();
        a.postal_code = "109".to_string();
        let err = a.validate(Role::Recipient).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidPostalCode {
                field: "recipient.postal_code",
                value: "109".to_string()
            }
        );
    }

    #[test]
    fn phone_with_letters_rejected() {
        let mut a = address();
        a.phone = "08-1234-567x".to_string();
        assert!(matches!(
            a.validate(Role::Sender),
            Err(ValidationError::InvalidPhone { .. })
        ));
    }

    #[test]
    fn blank_name_rejected() {
        let mut a = address();
        a.name = "   ".to_string();
        assert_eq!(
            a.validate(Role::Sender),
            Err(ValidationError::EmptyField {
                field: "sender.name"
            })
        );
    }

    #[test]
    fn parcel_weight_bounds() {
        let mut p = Parcel {
            weight_grams: 1000,
            length_cm: 20,
            width_cm: 15,
            height_cm: 10,
        };
        assert!(p.validate().is_ok());
        p.weight_grams = 0;
        assert!(p.validate().is_err());
        p.weight_grams = MAX_WEIGHT_GRAMS + 1;
        assert!(p.validate().is_err());
    }

    #[test]
    fn parcel_zero_dimension_rejected() {
        let p = Parcel {
            weight_grams: 1000,
            length_cm: 0,
            width_cm: 15,
            height_cm: 10,
        };
        assert!(matches!(
            p.validate(),
            Err(ValidationError::InvalidDimension {
                field: "length_cm",
                ..
            })
        ));
    }

    #[test]
    fn cod_enabled_requires_positive_amount() {
        assert!(CodInfo::collect(Amount::ZERO).validate().is_err());
        assert!(CodInfo::collect(Amount::from_major(500)).validate().is_ok());
        assert!(CodInfo::NONE.validate().is_ok());
    }

    #[test]
    fn disabled_cod_is_not_chargeable() {
        let cod = CodInfo {
            enabled: false,
            amount: Amount::from_major(500),
        };
        assert_eq!(cod.chargeable_amount(), Amount::ZERO);
    }
}
