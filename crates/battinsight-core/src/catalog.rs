//! Static description of the telemetry tables handed to the SQL generator.

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: &'static str,
    pub about: &'static str,
}

#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: Vec<ColumnSpec>,
}

fn col(name: &'static str, kind: &'static str, about: &'static str) -> ColumnSpec {
    ColumnSpec { name, kind, about }
}

pub fn battery_tables() -> Vec<TableSpec> {
    vec![
        TableSpec {
            name: "battery_data",
            columns: vec![
                col("id", "integer", "Primary key"),
                col("batt_alias", "text", "Battery identifier"),
                col("country", "text", "Country name"),
                col("continent", "text", "Continent name"),
                col("climate", "text", "Climate type"),
                col("iso_a3", "text", "ISO 3166-1 alpha-3 country code"),
                col("model_series", "integer", "Model series identifier"),
                col("var", "text", "Measured variable name"),
                col("val", "real", "Measured value"),
                col("descr", "text", "Description"),
                col("cnt_vhcl", "integer", "Vehicle count"),
            ],
        },
        TableSpec {
            name: "model_series",
            columns: vec![
                col("id", "integer", "Primary key"),
                col("series_name", "text", "Name of the series"),
                col("release_year", "integer", "Year of release"),
                col("description", "text", "Description"),
            ],
        },
    ]
}

/// Renders the tables the policy allows, in the prompt's schema format.
pub fn describe(allowed_tables: &[String]) -> String {
    let mut out = String::from("Database Schema:\n");
    for table in battery_tables() {
        if !allowed_tables.iter().any(|t| t.eq_ignore_ascii_case(table.name)) {
            continue;
        }
        out.push_str(&format!("- {} table:\n", table.name));
        for c in &table.columns {
            out.push_str(&format!("  - {} ({}): {}\n", c.name, c.kind, c.about));
        }
    }
    out
}
