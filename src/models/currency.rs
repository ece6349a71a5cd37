use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::core::error::Error;
use crate::models::Model;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    #[serde(alias = "Currency Code")]
    pub code: String,
    #[serde(alias = "Currency Name")]
    pub name: String,
    #[serde(alias = "Country Code", default)]
    pub country_code: Option<String>,
    #[serde(alias = "Central Bank", default)]
    pub central_bank: Option<String>,
    #[serde(alias = "Financial Capital", default)]
    pub financial_capital: Option<String>,
    #[serde(alias = "Financial Capital Timezone", default)]
    pub financial_capital_timezone: Option<String>,
    #[serde(alias = "Weekend Definition", default)]
    pub weekend_definition: Option<String>,
}

impl Model for Currency {
    const NAME: &'static str = "Currency";
    const FIELDS: &'static [&'static str] = &[
        "code",
        "name",
        "country_code",
        "central_bank",
        "financial_capital",
        "financial_capital_timezone",
        "weekend_definition",
    ];
}

impl Currency {
    /// Settlement holidays of this currency with dates in `start..=end` (ISO dates).
    pub fn list_holidays(
        &self,
        catalog: &mut Catalog,
        start: &str,
        end: &str,
    ) -> Result<Vec<CurrencyHoliday>, Error> {
        Ok(catalog
            .filter::<CurrencyHoliday>(start, end, Some(&self.code))?
            .collect())
    }

    #[cfg(test)]
    pub(crate) fn sample(code: &str) -> Self {
        Self {
            code: code.to_string(),
            name: format!("{code} currency"),
            country_code: Some(code[..2].to_string()),
            central_bank: None,
            financial_capital: Some("Capital".to_string()),
            financial_capital_timezone: Some("UTC".to_string()),
            weekend_definition: Some("Sat-Sun".to_string()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CurrencyHoliday {
    #[serde(alias = "Currency Code")]
    pub currency_code: String,
    #[serde(alias = "Date")]
    pub date: String,
    #[serde(alias = "Holiday Name", default)]
    pub holiday_name: Option<String>,
    #[serde(alias = "Settlement", default)]
    pub settlement: Option<String>,
    #[serde(alias = "Observed", default)]
    pub observed: Option<String>,
    #[serde(alias = "Memo", default)]
    pub memo: Option<String>,
}

impl Model for CurrencyHoliday {
    const NAME: &'static str = "CurrencyHoliday";
    const FIELDS: &'static [&'static str] = &[
        "currency_code",
        "date",
        "holiday_name",
        "settlement",
        "observed",
        "memo",
    ];
}
