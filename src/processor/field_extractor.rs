use regex::Regex;

use crate::error::Result;
use crate::models::RawListing;

/// Categorical sentinel for addresses/routes that match no pattern
pub const UNKNOWN: &str = "unknown";

/// Age text used for a building that has just been completed
pub const NEW_CONSTRUCTION: &str = "新築";

/// Outcome of extracting one raw text field. `Unmatched` is the malformed
/// case: it never aborts the batch, the caller substitutes a default or
/// leaves the value for imputation.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<T> {
    Value(T),
    Unmatched,
}

impl<T> Extracted<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Extracted::Value(v) => Some(v),
            Extracted::Unmatched => None,
        }
    }

    pub fn is_unmatched(&self) -> bool {
        matches!(self, Extracted::Unmatched)
    }

    pub fn unwrap_or(self, default: T) -> T {
        self.value().unwrap_or(default)
    }
}

impl<T> From<Option<T>> for Extracted<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Extracted::Value(v),
            None => Extracted::Unmatched,
        }
    }
}

/// One extraction rule for one raw field
pub trait FieldStrategy: Send + Sync {
    type Output;

    /// Name of the raw column this strategy reads
    fn field(&self) -> &'static str;

    fn extract(&self, raw: Option<&str>) -> Extracted<Self::Output>;
}

pub type NumericStrategy = Box<dyn FieldStrategy<Output = f64>>;
pub type LabelStrategy = Box<dyn FieldStrategy<Output = String>>;

/// First digit run captured by `pattern`, as a float
fn capture_number(pattern: &Regex, text: &str) -> Option<f64> {
    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// "新築" → 0, "築12年" / "12年" → 12
pub struct AgeYears {
    pattern: Regex,
}

impl AgeYears {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r"([0-9]+)年")?,
        })
    }
}

impl FieldStrategy for AgeYears {
    type Output = f64;

    fn field(&self) -> &'static str {
        "age"
    }

    fn extract(&self, raw: Option<&str>) -> Extracted<f64> {
        let Some(text) = raw.map(str::trim) else {
            return Extracted::Unmatched;
        };
        if text == NEW_CONSTRUCTION {
            return Extracted::Value(0.0);
        }
        capture_number(&self.pattern, text).into()
    }
}

/// "10階建" → 10. Basement-only descriptions have no match.
pub struct TotalFloors {
    pattern: Regex,
}

impl TotalFloors {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r"([0-9]+)階建")?,
        })
    }
}

impl FieldStrategy for TotalFloors {
    type Output = f64;

    fn field(&self) -> &'static str {
        "floors"
    }

    fn extract(&self, raw: Option<&str>) -> Extracted<f64> {
        raw.and_then(|text| capture_number(&self.pattern, text)).into()
    }
}

/// "ＪＲ山手線/渋谷駅 歩5分" → 5
pub struct WalkMinutes {
    pattern: Regex,
}

impl WalkMinutes {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r"歩([0-9]+)分")?,
        })
    }
}

impl FieldStrategy for WalkMinutes {
    type Output = f64;

    fn field(&self) -> &'static str {
        "transportation_1"
    }

    fn extract(&self, raw: Option<&str>) -> Extracted<f64> {
        raw.and_then(|text| capture_number(&self.pattern, text)).into()
    }
}

/// "40.5", "40.5m2" or "40.5㎡" → 40.5; zero and negative areas are unmatched
pub struct AreaM2;

impl FieldStrategy for AreaM2 {
    type Output = f64;

    fn field(&self) -> &'static str {
        "area"
    }

    fn extract(&self, raw: Option<&str>) -> Extracted<f64> {
        raw.map(|text| {
            text.trim()
                .trim_end_matches("m2")
                .trim_end_matches("m²")
                .trim_end_matches('㎡')
                .trim()
                .to_string()
        })
        .and_then(|cleaned| cleaned.parse::<f64>().ok())
        .filter(|area| area.is_finite() && *area > 0.0)
        .into()
    }
}

/// Leading room count of a layout code: "2LDK" → 2. "ワンルーム" has none.
pub struct LayoutRooms {
    pattern: Regex,
}

impl LayoutRooms {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r"^\s*([0-9]+)")?,
        })
    }
}

impl FieldStrategy for LayoutRooms {
    type Output = f64;

    fn field(&self) -> &'static str {
        "layout"
    }

    fn extract(&self, raw: Option<&str>) -> Extracted<f64> {
        raw.and_then(|text| capture_number(&self.pattern, text)).into()
    }
}

/// Which of the L/D/K/S/R letters a layout code carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutFlags {
    pub has_l: bool,
    pub has_d: bool,
    pub has_k: bool,
    pub has_s: bool,
    pub has_r: bool,
}

impl LayoutFlags {
    /// Case-sensitive letter test
    pub fn from_layout(layout: &str) -> Self {
        Self {
            has_l: layout.contains('L'),
            has_d: layout.contains('D'),
            has_k: layout.contains('K'),
            has_s: layout.contains('S'),
            has_r: layout.contains('R'),
        }
    }
}

pub struct LayoutLetters;

impl FieldStrategy for LayoutLetters {
    type Output = LayoutFlags;

    fn field(&self) -> &'static str {
        "layout"
    }

    fn extract(&self, raw: Option<&str>) -> Extracted<LayoutFlags> {
        match raw {
            Some(text) => Extracted::Value(LayoutFlags::from_layout(text)),
            None => Extracted::Unmatched,
        }
    }
}

/// Ward or city following a fixed prefecture prefix:
/// "東京都渋谷区神南1" → "渋谷区"
pub struct CityFromAddress {
    pattern: Regex,
}

impl CityFromAddress {
    pub fn new(prefecture: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(&format!("{}(.*?[市区])", regex::escape(prefecture)))?,
        })
    }
}

impl FieldStrategy for CityFromAddress {
    type Output = String;

    fn field(&self) -> &'static str {
        "address"
    }

    fn extract(&self, raw: Option<&str>) -> Extracted<String> {
        raw.and_then(|address| self.pattern.captures(address))
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
            .into()
    }
}

/// Route name before the first "/": "ＪＲ山手線/渋谷駅 歩5分" → "ＪＲ山手線"
pub struct LineName;

impl FieldStrategy for LineName {
    type Output = String;

    fn field(&self) -> &'static str {
        "transportation_1"
    }

    fn extract(&self, raw: Option<&str>) -> Extracted<String> {
        raw.and_then(|text| text.split('/').next())
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .into()
    }
}

/// Typed fields of one listing before imputation
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFields {
    pub age_years: Option<f64>,
    pub total_floors: Option<f64>,
    pub walk_minutes: Option<f64>,
    pub area_m2: Option<f64>,
    pub layout_flags: LayoutFlags,
    pub layout_rooms: f64,
    pub city: String,
    pub line: String,
}

/// Applies one strategy per raw field. Every method is total.
pub struct FieldExtractor {
    age: NumericStrategy,
    floors: NumericStrategy,
    walk: NumericStrategy,
    area: NumericStrategy,
    rooms: NumericStrategy,
    layout: LayoutLetters,
    city: LabelStrategy,
    line: LabelStrategy,
}

impl FieldExtractor {
    pub fn new(prefecture: &str) -> Result<Self> {
        Ok(Self {
            age: Box::new(AgeYears::new()?),
            floors: Box::new(TotalFloors::new()?),
            walk: Box::new(WalkMinutes::new()?),
            area: Box::new(AreaM2),
            rooms: Box::new(LayoutRooms::new()?),
            layout: LayoutLetters,
            city: Box::new(CityFromAddress::new(prefecture)?),
            line: Box::new(LineName),
        })
    }

    pub fn with_walk_strategy(mut self, strategy: NumericStrategy) -> Self {
        self.walk = strategy;
        self
    }

    pub fn extract_age_years(&self, text: &str) -> Extracted<f64> {
        self.age.extract(Some(text))
    }

    pub fn extract_total_floors(&self, text: &str) -> Extracted<f64> {
        self.floors.extract(Some(text))
    }

    /// Only the first listed route counts; it is taken to be the nearest.
    pub fn extract_walk_minutes(&self, transportation_1: Option<&str>) -> Extracted<f64> {
        self.walk.extract(transportation_1)
    }

    pub fn extract_area_m2(&self, text: &str) -> Extracted<f64> {
        self.area.extract(Some(text))
    }

    pub fn extract_layout_flags(&self, text: &str) -> LayoutFlags {
        self.layout.extract(Some(text)).value().unwrap_or_default()
    }

    /// Defaults to a single room when the code has no leading count
    pub fn extract_layout_rooms(&self, text: &str) -> f64 {
        self.rooms.extract(Some(text)).unwrap_or(1.0)
    }

    pub fn extract_city(&self, address: &str) -> String {
        self.city.extract(Some(address)).unwrap_or_else_unknown()
    }

    pub fn extract_line(&self, transportation_1: Option<&str>) -> String {
        self.line.extract(transportation_1).unwrap_or_else_unknown()
    }

    /// Extract every typed field of a listing. The returned names are the
    /// raw columns that degraded.
    pub fn extract_listing(&self, listing: &RawListing) -> (ExtractedFields, Vec<&'static str>) {
        let mut degraded = Vec::new();
        let mut track = |strategy_field: &'static str, unmatched: bool| {
            if unmatched {
                degraded.push(strategy_field);
            }
        };

        let transportation_1 = listing.transportation_1.as_deref();

        let age = self.age.extract(Some(&listing.age));
        track(self.age.field(), age.is_unmatched());
        let floors = self.floors.extract(Some(&listing.floors));
        track(self.floors.field(), floors.is_unmatched());
        let walk = self.walk.extract(transportation_1);
        track(self.walk.field(), walk.is_unmatched());
        let area = self.area.extract(Some(&listing.area));
        track(self.area.field(), area.is_unmatched());
        let city = self.city.extract(Some(&listing.address));
        track(self.city.field(), city.is_unmatched());

        let fields = ExtractedFields {
            age_years: age.value(),
            total_floors: floors.value(),
            walk_minutes: walk.value(),
            area_m2: area.value(),
            layout_flags: self.extract_layout_flags(&listing.layout),
            layout_rooms: self.extract_layout_rooms(&listing.layout),
            city: city.unwrap_or_else_unknown(),
            line: self.extract_line(transportation_1),
        };

        (fields, degraded)
    }
}

impl Extracted<String> {
    fn unwrap_or_else_unknown(self) -> String {
        self.value().unwrap_or_else(|| UNKNOWN.to_string())
    }
}
