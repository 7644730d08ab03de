//! Supplier price list import
//!
//! Walks a directory for `*.prices` files and loads the materials and jars
//! they list into the catalog. One entry per line:
//!
//! ```text
//! # type      | name            | cost       | stock
//! wax         | Soy Wax 464     | 0.02/g     | 25000 g
//! fragrance   | Lavender        | 0.05/g     | 1200 g
//! jar         | Amber 200       | 200 ml     | 1.50   | 48
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::Connection;
use walkdir::WalkDir;

use crate::db;
use crate::models::{Jar, Material, MaterialType};

pub const PRICE_LIST_EXTENSION: &str = "prices";

/// One parsed line of a price list
#[derive(Debug, Clone, PartialEq)]
pub enum PriceEntry {
    Material {
        name: String,
        material_type: MaterialType,
        unit_cost: f64,
        stock_grams: f64,
    },
    Jar {
        name: String,
        capacity_ml: f64,
        unit_price: f64,
        stock_units: i64,
    },
}

#[derive(Debug, Default, PartialEq)]
pub struct ParsedList {
    pub entries: Vec<PriceEntry>,
    pub bad_lines: Vec<usize>, // 1-based line numbers
}

/// Compiled line patterns, shared across every file of an import
pub struct LinePatterns {
    material: Regex,
    jar: Regex,
}

impl LinePatterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            material: Regex::new(
                r"(?i)^\s*(wax|cera|additive|aditivo|fragrance|esencia|other|otro)\s*\|\s*([^|]+?)\s*\|\s*([\d.]+)\s*/\s*g\s*\|\s*([\d.]+)\s*g?\s*$",
            )?,
            jar: Regex::new(
                r"(?i)^\s*(?:jar|frasco)\s*\|\s*([^|]+?)\s*\|\s*([\d.]+)\s*ml\s*\|\s*([\d.]+)\s*\|\s*(\d+)\s*$",
            )?,
        })
    }

    fn parse_line(&self, line: &str) -> Option<PriceEntry> {
        if let Some(cap) = self.material.captures(line) {
            return Some(PriceEntry::Material {
                material_type: cap[1].parse().ok()?,
                name: cap[2].to_string(),
                unit_cost: cap[3].parse().ok()?,
                stock_grams: cap[4].parse().ok()?,
            });
        }
        if let Some(cap) = self.jar.captures(line) {
            let capacity_ml: f64 = cap[2].parse().ok()?;
            if capacity_ml <= 0.0 {
                return None;
            }
            return Some(PriceEntry::Jar {
                name: cap[1].to_string(),
                capacity_ml,
                unit_price: cap[3].parse().ok()?,
                stock_units: cap[4].parse().ok()?,
            });
        }
        None
    }
}

/// Parse the text of one price list
pub fn parse_price_list(patterns: &LinePatterns, content: &str) -> ParsedList {
    let mut parsed = ParsedList::default();

    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match patterns.parse_line(trimmed) {
            Some(entry) => parsed.entries.push(entry),
            None => parsed.bad_lines.push(index + 1),
        }
    }

    parsed
}

/// Find all price list files under a directory
pub fn find_price_lists(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().is_some_and(|ext| ext == PRICE_LIST_EXTENSION)
        {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

/// Import every price list under `dir` into the catalog
pub fn import_directory(conn: &Connection, dir: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    tracing::info!("Scanning {} for price lists...", dir.display());
    let files = find_price_lists(dir)?;
    tracing::info!("Found {} price list files", files.len());
    let patterns = LinePatterns::new()?;

    for path in &files {
        let content = match fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
        {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("{:#}", e);
                stats.errors += 1;
                continue;
            }
        };
        stats.files += 1;

        let parsed = parse_price_list(&patterns, &content);
        for line in &parsed.bad_lines {
            tracing::warn!("{}:{}: unrecognised price list line", path.display(), line);
        }
        stats.skipped += parsed.bad_lines.len();

        for entry in parsed.entries {
            match entry {
                PriceEntry::Material {
                    name,
                    material_type,
                    unit_cost,
                    stock_grams,
                } => {
                    db::upsert_material(
                        conn,
                        &Material {
                            id: 0,
                            name,
                            material_type,
                            unit_cost,
                            stock_grams,
                            unit_label: "g".to_string(),
                        },
                    )?;
                    stats.materials += 1;
                }
                PriceEntry::Jar {
                    name,
                    capacity_ml,
                    unit_price,
                    stock_units,
                } => {
                    db::upsert_jar(
                        conn,
                        &Jar {
                            id: 0,
                            name,
                            capacity_ml,
                            unit_price,
                            stock_units,
                        },
                    )?;
                    stats.jars += 1;
                }
            }
        }

        tracing::debug!("Imported {}", path.display());
    }

    Ok(stats)
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub files: usize,
    pub materials: usize,
    pub jars: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} materials and {} jars from {} files. Skipped lines: {}, Errors: {}",
            self.materials, self.jars, self.files, self.skipped, self.errors
        )
    }
}
