//! Candle Costing
//!
//! Recipe costing, pricing and stock calculator for a candle workshop.

mod builder;
mod calculator;
mod config;
mod db;
mod import;
mod models;
mod report;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

use crate::builder::{RecipeDraft, SlotChoice};
use crate::models::{FixedCostSchedule, Jar, Material, MaterialType};

#[derive(Parser)]
#[command(name = "candle-costing")]
#[command(about = "Recipe costing and stock calculator for a candle workshop")]
struct Cli {
    /// Path to the SQLite database (overrides the config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Load a sample catalog and recipe
    LoadSample,

    /// Import supplier price lists (*.prices) from a directory
    Import {
        dir: PathBuf,

        /// Clear catalog and recipes before importing
        #[arg(long)]
        clear: bool,
    },

    /// Add or update a raw material
    AddMaterial {
        name: String,

        /// wax, additive, fragrance or other
        #[arg(short = 't', long = "type", value_parser = parse_material_type)]
        material_type: MaterialType,

        /// Cost per gram
        #[arg(long)]
        cost: f64,

        /// Stock in grams
        #[arg(long, default_value = "0")]
        stock: f64,

        #[arg(long, default_value = "g")]
        unit: String,
    },

    /// Add or update a jar
    AddJar {
        name: String,

        /// Capacity in ml
        #[arg(long)]
        capacity: f64,

        /// Price per jar
        #[arg(long)]
        price: f64,

        #[arg(long, default_value = "0")]
        stock: i64,
    },

    /// List raw materials
    Materials,

    /// List jars
    Jars,

    /// Cost a recipe without saving it
    Quote(DraftArgs),

    /// Cost and save a recipe
    RecipeAdd {
        name: String,

        #[command(flatten)]
        draft: DraftArgs,
    },

    /// List saved recipes
    Recipes,

    /// Show a saved recipe's cost sheet
    Recipe { id: i64 },

    /// Recompute a saved recipe with current material and jar prices
    Recalc { id: i64 },

    /// Delete a saved recipe
    RecipeDelete { id: i64 },

    /// Show materials and jars a recipe's batch needs against stock
    Requirements { id: i64 },

    /// Produce a recipe's batch: deduct materials and jars, add finished candles
    Produce { id: i64 },

    /// Set the finished-candle stock below which a recipe is alerted
    SetMinimum {
        id: i64,

        #[arg(value_parser = clap::value_parser!(i64).range(0..))]
        min: i64,
    },

    /// Print a report
    Report {
        #[arg(value_enum)]
        kind: ReportKind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportKind {
    Costs,
    Stock,
    Valuation,
}

#[derive(Args)]
struct DraftArgs {
    /// Jar id
    #[arg(long)]
    jar: i64,

    /// Grams per unit (defaults to the jar capacity)
    #[arg(long)]
    gramage: Option<f64>,

    /// Units to produce
    #[arg(short, long, default_value = "1")]
    units: u32,

    /// Wax as MATERIAL_ID:PERCENT
    #[arg(long, value_parser = parse_slot_choice)]
    wax: Option<SlotChoice>,

    /// Additive as MATERIAL_ID:PERCENT
    #[arg(long, value_parser = parse_slot_choice)]
    additive: Option<SlotChoice>,

    /// Fragrance as MATERIAL_ID:PERCENT
    #[arg(long, value_parser = parse_slot_choice)]
    fragrance: Option<SlotChoice>,

    /// Profit margin percentage (defaults to the configured margin)
    #[arg(short, long)]
    margin: Option<f64>,

    #[arg(long)]
    wick_and_tab: Option<f64>,
    #[arg(long)]
    labor: Option<f64>,
    #[arg(long)]
    utilities: Option<f64>,
    #[arg(long)]
    napkins: Option<f64>,
    #[arg(long)]
    dye: Option<f64>,
    #[arg(long)]
    stickers: Option<f64>,
    #[arg(long)]
    packaging: Option<f64>,
}

impl DraftArgs {
    fn to_draft(&self) -> RecipeDraft {
        RecipeDraft {
            jar_id: self.jar,
            gramage_total: self.gramage,
            units: self.units,
            wax: self.wax,
            additive: self.additive,
            fragrance: self.fragrance,
            margin_percent: self.margin,
            fixed_costs: FixedCostSchedule {
                wick_and_tab: self.wick_and_tab,
                labor: self.labor,
                utilities: self.utilities,
                napkins: self.napkins,
                dye: self.dye,
                stickers: self.stickers,
                packaging: self.packaging,
            },
        }
    }
}

fn parse_material_type(s: &str) -> Result<MaterialType, String> {
    s.parse()
}

fn parse_slot_choice(s: &str) -> Result<SlotChoice, String> {
    let (id, pct) = s
        .split_once(':')
        .ok_or_else(|| format!("expected MATERIAL_ID:PERCENT, got '{}'", s))?;
    Ok(SlotChoice {
        material_id: id.trim().parse().map_err(|_| format!("bad material id '{}'", id))?,
        percentage: pct.trim().parse().map_err(|_| format!("bad percentage '{}'", pct))?,
    })
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;
    let db_path = cli.database.clone().unwrap_or(config.database.path.clone());
    tracing::debug!("Opening database {}", db_path.display());

    let conn = Connection::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", db_path.display());
        }

        Commands::LoadSample => {
            load_sample_data(&conn, &config.costing)?;
            println!("Sample data loaded successfully!");
        }

        Commands::Import { dir, clear } => {
            if clear {
                tracing::info!("Clearing existing data...");
                db::clear_all(&conn)?;
            }

            let stats = import::import_directory(&conn, &dir)?;
            println!("{}", stats);
        }

        Commands::AddMaterial {
            name,
            material_type,
            cost,
            stock,
            unit,
        } => {
            let id = db::upsert_material(
                &conn,
                &Material {
                    id: 0,
                    name: name.clone(),
                    material_type,
                    unit_cost: cost,
                    stock_grams: stock,
                    unit_label: unit,
                },
            )
            .with_context(|| format!("Failed to save material '{}'", name))?;
            println!("Material '{}' saved with id {}", name, id);
        }

        Commands::AddJar {
            name,
            capacity,
            price,
            stock,
        } => {
            let id = db::upsert_jar(
                &conn,
                &Jar {
                    id: 0,
                    name: name.clone(),
                    capacity_ml: capacity,
                    unit_price: price,
                    stock_units: stock,
                },
            )
            .with_context(|| format!("Failed to save jar '{}'", name))?;
            println!("Jar '{}' saved with id {}", name, id);
        }

        Commands::Materials => {
            let materials = db::list_materials(&conn)?;
            if materials.is_empty() {
                println!("No materials in database. Run 'import' or 'load-sample' first.");
            } else {
                println!(
                    "{:>4} {:<24} {:<10} {:>10} {:>12}",
                    "ID", "Material", "Type", "Cost/g", "Stock"
                );
                println!("{}", "-".repeat(64));
                for m in materials {
                    println!(
                        "{:>4} {:<24} {:<10} {:>10.4} {:>10.1} {}",
                        m.id,
                        m.name,
                        m.material_type.to_string(),
                        m.unit_cost,
                        m.stock_grams,
                        m.unit_label
                    );
                }
            }
        }

        Commands::Jars => {
            let jars = db::list_jars(&conn)?;
            if jars.is_empty() {
                println!("No jars in database. Run 'import' or 'load-sample' first.");
            } else {
                println!(
                    "{:>4} {:<24} {:>10} {:>10} {:>8}",
                    "ID", "Jar", "ml", "Price", "Stock"
                );
                println!("{}", "-".repeat(60));
                for j in jars {
                    println!(
                        "{:>4} {:<24} {:>10.1} {:>10.2} {:>8}",
                        j.id, j.name, j.capacity_ml, j.unit_price, j.stock_units
                    );
                }
            }
        }

        Commands::Quote(args) => {
            let (input, jar) = builder::build_input(&conn, &args.to_draft(), &config.costing)?;
            let costs = calculator::preview(&input)?;

            println!("Jar: {}", jar.name);
            println!("{}", costs);

            let total = calculator::composition_total(&input);
            if (total - 100.0).abs() > calculator::COMPOSITION_TOLERANCE {
                println!(
                    "Warning: percentages add up to {:.2}%, the recipe cannot be saved until they add up to 100%",
                    total
                );
            }
        }

        Commands::RecipeAdd { name, draft } => {
            let (input, jar) = builder::build_input(&conn, &draft.to_draft(), &config.costing)?;
            let costs = calculator::calculate(&input)
                .with_context(|| format!("Recipe '{}' is not valid", name))?;
            let id = db::insert_recipe(&conn, &name, jar.id, &input, &costs)?;
            tracing::info!(id, recipe = %name, "recipe saved");

            println!("Recipe '{}' saved with id {}", name, id);
            println!("{}", costs);
        }

        Commands::Recipes => {
            let recipes = db::list_recipes(&conn)?;
            if recipes.is_empty() {
                println!("No recipes saved.");
            } else {
                println!(
                    "{:>4} {:<28} {:>8} {:>6} {:>12}",
                    "ID", "Recipe", "Grams", "Units", "Price"
                );
                println!("{}", "-".repeat(62));
                for r in recipes {
                    println!(
                        "{:>4} {:<28} {:>8.0} {:>6} {:>12.2}",
                        r.id, r.name, r.input.gramage_total, r.input.units, r.suggested_price
                    );
                }
            }
        }

        Commands::Recipe { id } => {
            let recipe = find_recipe(&conn, id)?;
            let jar = db::get_jar(&conn, recipe.jar_id)?;

            println!("Recipe: {}", recipe.name);
            println!("  ID: {}", recipe.id);
            match jar {
                Some(j) => println!("  Jar: {} ({}ml)", j.name, j.capacity_ml),
                None => println!("  Jar: {} (deleted)", recipe.jar_id),
            }
            for (name, amount) in recipe.input.fixed_costs.resolved() {
                println!("  {:<14} {:>10.2}", name, amount);
            }
            println!();
            println!("{}", calculator::compute(&recipe.input));
        }

        Commands::Recalc { id } => {
            let (recipe, costs) = builder::recalculate_recipe(&conn, id)?;
            println!(
                "Recipe '{}': suggested price {:.2} -> {:.2}",
                recipe.name, recipe.suggested_price, costs.suggested_price
            );
        }

        Commands::RecipeDelete { id } => {
            if db::delete_recipe(&conn, id)? {
                println!("Recipe {} deleted", id);
            } else {
                println!("Recipe {} not found", id);
            }
        }

        Commands::Requirements { id } => {
            let recipe = find_recipe(&conn, id)?;
            let needs = report::batch_requirements(&conn, &recipe)?;
            println!("{}", needs);
            if needs.has_shortage() {
                println!("Stock is not sufficient for this batch.");
            }
        }

        Commands::Produce { id } => {
            let recipe = find_recipe(&conn, id)?;
            let needs = report::produce_batch(&conn, &recipe)?;
            let on_hand = db::get_finished_good(&conn, id)?.map_or(0, |g| g.stock_units);
            println!(
                "Produced {} x {} ({} on hand)",
                needs.units, needs.recipe_name, on_hand
            );
        }

        Commands::SetMinimum { id, min } => {
            db::set_minimum_stock(&conn, id, min)?;
            println!("Recipe {} minimum stock set to {}", id, min);
        }

        Commands::Report { kind } => match kind {
            ReportKind::Costs => println!("{}", report::cost_report(&conn)?),
            ReportKind::Stock => println!("{}", report::stock_report(&conn, &config.alerts)?),
            ReportKind::Valuation => println!("{}", report::valuation(&conn)?),
        },
    }

    Ok(())
}

fn find_recipe(conn: &Connection, id: i64) -> Result<models::Recipe> {
    match db::get_recipe(conn, id)? {
        Some(recipe) => Ok(recipe),
        None => bail!("Recipe {} not found", id),
    }
}

/// Load a small sample catalog and one recipe
fn load_sample_data(conn: &Connection, costing: &config::CostingConfig) -> Result<()> {
    db::clear_all(conn)?;

    let add = |name: &str, material_type, unit_cost, stock_grams| {
        db::upsert_material(
            conn,
            &Material {
                id: 0,
                name: name.to_string(),
                material_type,
                unit_cost,
                stock_grams,
                unit_label: "g".to_string(),
            },
        )
    };

    let soy = add("Soy Wax", MaterialType::Wax, 0.02, 25000.0)?;
    add("Paraffin", MaterialType::Wax, 0.015, 8000.0)?;
    let stearin = add("Stearin", MaterialType::Additive, 0.10, 2000.0)?;
    let lavender = add("Lavender", MaterialType::Fragrance, 0.05, 1500.0)?;
    add("Vanilla", MaterialType::Fragrance, 0.06, 600.0)?;
    add("Cotton Wick", MaterialType::Other, 0.30, 300.0)?;

    let amber = db::upsert_jar(
        conn,
        &Jar {
            id: 0,
            name: "Amber 200".to_string(),
            capacity_ml: 200.0,
            unit_price: 1.50,
            stock_units: 48,
        },
    )?;
    db::upsert_jar(
        conn,
        &Jar {
            id: 0,
            name: "Tin 120".to_string(),
            capacity_ml: 120.0,
            unit_price: 0.90,
            stock_units: 8,
        },
    )?;

    let draft = RecipeDraft {
        jar_id: amber,
        gramage_total: None,
        units: 10,
        wax: Some(SlotChoice {
            material_id: soy,
            percentage: 85.0,
        }),
        additive: Some(SlotChoice {
            material_id: stearin,
            percentage: 5.0,
        }),
        fragrance: Some(SlotChoice {
            material_id: lavender,
            percentage: 10.0,
        }),
        margin_percent: None,
        fixed_costs: FixedCostSchedule::default(),
    };
    let (input, jar) = builder::build_input(conn, &draft, costing)?;
    let costs = calculator::calculate(&input)?;
    db::insert_recipe(conn, "Lavender Amber 200", jar.id, &input, &costs)?;

    println!("Loaded {} sample materials, {} jars and {} recipe", 6, 2, 1);
    Ok(())
}
