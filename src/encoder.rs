use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::Result;
use crate::schema::{self, CropType, FeatureVector, NumericFields, SoilType};

/// A single loan application as submitted for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "finite_amounts"))]
pub struct LoanApplication {
    #[validate(range(min = 18, max = 80))]
    pub age: u32,
    #[validate(range(exclusive_min = 0.0))]
    pub land_size: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub income: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub loan_amount: f64,
    #[validate(range(min = 3, max = 60))]
    pub loan_term: u32,
    pub crop_type: String,
    pub soil_type: String,
    #[validate(range(max = 500))]
    pub rainfall: u32,
    pub previous_defaults: u32,
    pub market_index: f64,
}

/// Range checks pass NaN through, so every float is checked here as well.
fn finite_amounts(application: &LoanApplication) -> std::result::Result<(), ValidationError> {
    let amounts = [
        application.land_size,
        application.income,
        application.loan_amount,
        application.market_index,
    ];
    if amounts.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ValidationError::new("non_finite_amount"))
    }
}

impl LoanApplication {
    fn numeric(&self) -> NumericFields {
        NumericFields {
            age: f64::from(self.age),
            land_size: self.land_size,
            income: self.income,
            loan_amount: self.loan_amount,
            loan_term: f64::from(self.loan_term),
            previous_defaults: f64::from(self.previous_defaults),
            rainfall: f64::from(self.rainfall),
            market_index: self.market_index,
        }
    }
}

/// Encodes an application into the model's feature order.
///
/// Fails with `UnknownCategory` for crops or soils outside the lookup tables.
pub fn encode(application: &LoanApplication) -> Result<FeatureVector> {
    let crop = CropType::parse(&application.crop_type)?;
    let soil = SoilType::parse(&application.soil_type)?;
    Ok(schema::assemble(&application.numeric(), crop, soil))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RiskError;
    use crate::schema::{DEFAULT_MARKET_INDEX, N_FEATURES};

    fn application() -> LoanApplication {
        LoanApplication {
            age: 65,
            land_size: 0.5,
            income: 50_000.0,
            loan_amount: 400_000.0,
            loan_term: 12,
            crop_type: "Wheat".into(),
            soil_type: "Sandy".into(),
            rainfall: 120,
            previous_defaults: 4,
            market_index: DEFAULT_MARKET_INDEX,
        }
    }

    #[test]
    fn encodes_in_fixed_column_order() {
        let v = encode(&application()).unwrap();
        assert_eq!(v.len(), N_FEATURES);
        assert_eq!(
            v,
            [65.0, 0.5, 50_000.0, 0.0, 400_000.0, 12.0, 4.0, 120.0, 0.0, 50.0]
        );
    }

    #[test]
    fn encoding_is_pure() {
        let app = LoanApplication {
            crop_type: "Maize".into(),
            soil_type: "Clay".into(),
            ..application()
        };
        let first = encode(&app).unwrap();
        for _ in 0..5 {
            assert_eq!(encode(&app).unwrap(), first);
        }
        assert_eq!(first[3], 4.0);
        assert_eq!(first[8], 1.0);
    }

    #[test]
    fn unknown_soil_is_rejected() {
        let app = LoanApplication {
            soil_type: "Peat".into(),
            ..application()
        };
        assert!(matches!(
            encode(&app),
            Err(RiskError::UnknownCategory { field: "soil_type", .. })
        ));
    }

    #[test]
    fn validation_enforces_ranges() {
        assert!(application().validate().is_ok());
        let young = LoanApplication {
            age: 17,
            ..application()
        };
        assert!(young.validate().is_err());
        let no_land = LoanApplication {
            land_size: 0.0,
            ..application()
        };
        assert!(no_land.validate().is_err());
        let long_term = LoanApplication {
            loan_term: 72,
            ..application()
        };
        assert!(long_term.validate().is_err());
    }

    #[test]
    fn validation_rejects_non_finite_amounts() {
        let nan_index = LoanApplication {
            market_index: f64::NAN,
            ..application()
        };
        assert!(nan_index.validate().is_err());
        let nan_income = LoanApplication {
            income: f64::NAN,
            ..application()
        };
        assert!(nan_income.validate().is_err());
        let infinite_loan = LoanApplication {
            loan_amount: f64::INFINITY,
            ..application()
        };
        assert!(infinite_loan.validate().is_err());
    }
}
