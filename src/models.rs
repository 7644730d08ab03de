//! Data models for materials, jars and candle recipes

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialType {
    Wax,
    Additive,
    Fragrance,
    Other,
}

impl MaterialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialType::Wax => "wax",
            MaterialType::Additive => "additive",
            MaterialType::Fragrance => "fragrance",
            MaterialType::Other => "other",
        }
    }
}

impl FromStr for MaterialType {
    type Err = String;

    /// Accepts the English names and the workshop's Spanish labels
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wax" | "cera" => Ok(MaterialType::Wax),
            "additive" | "aditivo" => Ok(MaterialType::Additive),
            "fragrance" | "esencia" => Ok(MaterialType::Fragrance),
            "other" | "otro" => Ok(MaterialType::Other),
            other => Err(format!("unknown material type '{}'", other)),
        }
    }
}

impl fmt::Display for MaterialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    pub id: i64,
    pub name: String,
    pub material_type: MaterialType,
    pub unit_cost: f64,   // currency per gram
    pub stock_grams: f64,
    pub unit_label: String,
}

#[derive(Debug, Clone)]
pub struct Jar {
    pub id: i64,
    pub name: String,
    pub capacity_ml: f64, // filled 1:1 as grams of wax
    pub unit_price: f64,
    pub stock_units: i64,
}

/// Finished candles of one recipe on hand
#[derive(Debug, Clone)]
pub struct FinishedGood {
    pub recipe_id: i64,
    pub recipe_name: String,
    pub stock_units: i64,
    pub min_units: i64,   // alerted at or below this
    pub unit_price: f64,  // the recipe's suggested price
}

/// The three composition slots of a recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Wax,
    Additive,
    Fragrance,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Wax, Slot::Additive, Slot::Fragrance];

    /// Material type a slot must be filled with
    pub fn material_type(&self) -> MaterialType {
        match self {
            Slot::Wax => MaterialType::Wax,
            Slot::Additive => MaterialType::Additive,
            Slot::Fragrance => MaterialType::Fragrance,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.material_type().as_str())
    }
}

/// One filled composition slot, with the material's unit cost copied in
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInput {
    pub material_id: i64,
    pub percentage: f64,
    pub unit_cost: f64,
}

pub const DEFAULT_WICK_AND_TAB: f64 = 500.0;
pub const DEFAULT_LABOR: f64 = 2500.0;
pub const DEFAULT_UTILITIES: f64 = 400.0;
pub const DEFAULT_NAPKINS: f64 = 200.0;
pub const DEFAULT_DYE: f64 = 50.0;
pub const DEFAULT_STICKERS: f64 = 100.0;
pub const DEFAULT_PACKAGING: f64 = 1000.0;

pub const DEFAULT_MARGIN_PERCENT: f64 = 20.0;

/// Per-unit overhead added on top of material cost.
///
/// An unset field resolves to its default constant; an explicit zero stays zero.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FixedCostSchedule {
    pub wick_and_tab: Option<f64>,
    pub labor: Option<f64>,
    pub utilities: Option<f64>,
    pub napkins: Option<f64>,
    pub dye: Option<f64>,
    pub stickers: Option<f64>,
    pub packaging: Option<f64>,
}

impl FixedCostSchedule {
    /// Every field paired with its name and resolved amount
    pub fn resolved(&self) -> [(&'static str, f64); 7] {
        [
            ("wick_and_tab", self.wick_and_tab.unwrap_or(DEFAULT_WICK_AND_TAB)),
            ("labor", self.labor.unwrap_or(DEFAULT_LABOR)),
            ("utilities", self.utilities.unwrap_or(DEFAULT_UTILITIES)),
            ("napkins", self.napkins.unwrap_or(DEFAULT_NAPKINS)),
            ("dye", self.dye.unwrap_or(DEFAULT_DYE)),
            ("stickers", self.stickers.unwrap_or(DEFAULT_STICKERS)),
            ("packaging", self.packaging.unwrap_or(DEFAULT_PACKAGING)),
        ]
    }

    pub fn total(&self) -> f64 {
        self.resolved().iter().map(|(_, amount)| amount).sum()
    }

    /// Fill unset fields from `fallback`, keeping fields already set here
    pub fn or(&self, fallback: &FixedCostSchedule) -> FixedCostSchedule {
        FixedCostSchedule {
            wick_and_tab: self.wick_and_tab.or(fallback.wick_and_tab),
            labor: self.labor.or(fallback.labor),
            utilities: self.utilities.or(fallback.utilities),
            napkins: self.napkins.or(fallback.napkins),
            dye: self.dye.or(fallback.dye),
            stickers: self.stickers.or(fallback.stickers),
            packaging: self.packaging.or(fallback.packaging),
        }
    }
}

/// Everything the calculator needs for one recipe
#[derive(Debug, Clone, PartialEq)]
pub struct CostInput {
    pub gramage_total: f64, // grams per unit
    pub units: u32,         // batch size
    pub wax: Option<ComponentInput>,
    pub additive: Option<ComponentInput>,
    pub fragrance: Option<ComponentInput>,
    pub jar_unit_cost: f64,
    pub fixed_costs: FixedCostSchedule,
    pub margin_percent: f64,
}

impl CostInput {
    pub fn component(&self, slot: Slot) -> Option<&ComponentInput> {
        match slot {
            Slot::Wax => self.wax.as_ref(),
            Slot::Additive => self.additive.as_ref(),
            Slot::Fragrance => self.fragrance.as_ref(),
        }
    }
}

/// Result of a cost calculation
#[derive(Debug, Clone, PartialEq)]
pub struct CostBreakdown {
    pub components: Vec<ComponentBreakdown>,
    pub cost_per_unit: f64,   // materials + jar
    pub fixed_cost_total: f64,
    pub cost_total: f64,      // cost_per_unit + fixed_cost_total
    pub profit: f64,
    pub suggested_price: f64,
    pub batch_cost: f64,
    pub units: u32,
    pub gramage_total: f64,
    pub margin_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentBreakdown {
    pub slot: Slot,
    pub material_id: i64,
    pub percentage: f64,
    pub grams_per_unit: f64,
    pub grams_for_batch: f64,
    pub cost_per_unit: f64,
}

/// A stored recipe: its inputs as copied at save time plus the computed figures
#[derive(Debug, Clone)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub jar_id: i64,
    pub input: CostInput,
    pub cost_per_unit: f64,
    pub fixed_cost_total: f64,
    pub suggested_price: f64,
}
