use std::path::Path;

use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::models::{data_keys, SourceUnit};

/// Render a colored summary of the normalized units.
pub fn render(units: &[SourceUnit], path: &Path, verbose: bool, quiet: bool) {
    let dep_count: usize = units.iter().map(|u| u.dependencies.len()).sum();
    let file_count: usize = units.iter().map(|u| u.files.len()).sum();

    if quiet {
        println!(
            "Units: {}  Dependencies: {}  Files: {}",
            units.len().to_string().cyan(),
            dep_count.to_string().cyan(),
            file_count,
        );
        return;
    }

    println!("\n {} v{}", "depgraph".bold(), env!("CARGO_PKG_VERSION"));
    println!(" Root: {}\n", path.display());

    if units.is_empty() {
        println!(" {} No source units extracted.\n", "[WARN]".yellow().bold());
        return;
    }

    render_units(units);
    println!(
        "\n {} units, {} dependencies, {} files\n",
        units.len().to_string().bold(),
        dep_count.to_string().bold(),
        file_count.to_string().bold(),
    );

    if verbose {
        for unit in units.iter().filter(|u| !u.dependencies.is_empty()) {
            println!(" {} {}\n", "[UNIT]".green().bold(), unit.name.bold());
            render_dependencies(unit);
            println!();
        }
    }
}

fn render_units(units: &[SourceUnit]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Type").add_attribute(Attribute::Bold),
            Cell::new("Dir").add_attribute(Attribute::Bold),
            Cell::new("Files").add_attribute(Attribute::Bold),
            Cell::new("External").add_attribute(Attribute::Bold),
            Cell::new("Dependencies").add_attribute(Attribute::Bold),
        ]);

    for unit in units {
        let external = unit
            .data
            .get(data_keys::EXTRA_SOURCE_FILES)
            .and_then(|v| v.as_array())
            .map_or(0, Vec::len);
        let external_color = if external > 0 { Color::Yellow } else { Color::DarkGrey };

        table.add_row(vec![
            Cell::new(&unit.name),
            Cell::new(&unit.unit_type),
            Cell::new(&unit.dir),
            Cell::new(unit.files.len()).set_alignment(CellAlignment::Right),
            Cell::new(external)
                .fg(external_color)
                .set_alignment(CellAlignment::Right),
            Cell::new(unit.dependencies.len()).set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{}", table);
}

fn render_dependencies(unit: &SourceUnit) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Group").add_attribute(Attribute::Bold),
            Cell::new("Artifact").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("Scope").add_attribute(Attribute::Bold),
            Cell::new("Source").add_attribute(Attribute::Bold),
            Cell::new("Optional").add_attribute(Attribute::Bold),
        ]);

    for dep in &unit.dependencies {
        let optional = if dep.optional {
            Cell::new("yes").fg(Color::Yellow)
        } else {
            Cell::new("")
        };
        table.add_row(vec![
            Cell::new(&dep.group_id),
            Cell::new(&dep.artifact_id),
            Cell::new(&dep.version),
            Cell::new(dep.scope.as_deref().unwrap_or("-")),
            Cell::new(dep.kind.to_string()).fg(Color::DarkGrey),
            optional.set_alignment(CellAlignment::Center),
        ]);
    }

    println!("{}", table);
}
