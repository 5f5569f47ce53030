use serde::{Deserialize, Serialize};

/// Raw column names of a listing row, in file order.
pub const RAW_COLUMNS: [&str; 13] = [
    "building_name",
    "address",
    "transportation_1",
    "transportation_2",
    "transportation_3",
    "age",
    "floors",
    "rent",
    "admin_fee",
    "deposit",
    "gratuity",
    "layout",
    "area",
];

/// One rentable unit as scraped. Building-level fields (name, address,
/// transportation, age, floors) repeat across units of the same building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub building_name: String,
    pub address: String,
    pub transportation_1: Option<String>,
    pub transportation_2: Option<String>,
    pub transportation_3: Option<String>,
    pub age: String,
    pub floors: String,
    /// Monthly rent in units of 10,000 yen
    pub rent: f64,
    /// Management fee in yen
    pub admin_fee: f64,
    pub deposit: f64,
    pub gratuity: f64,
    pub layout: String,
    /// Floor area in square meters, still textual
    pub area: String,
}

/// Model verdict for one listing. `listing_index` joins back to the batch
/// the record was scored from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub listing_index: usize,
    pub actual_rent: f64,
    pub predicted_rent: f64,
    pub difference: f64,
    /// `None` when the actual rent is zero or the ratio is not finite
    pub discount_rate: Option<f64>,
}
