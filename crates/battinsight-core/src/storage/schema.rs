pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS model_series (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  series_name TEXT NOT NULL UNIQUE,
  release_year INTEGER,
  description TEXT
);

CREATE TABLE IF NOT EXISTS battery_data (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  batt_alias TEXT NOT NULL,
  country TEXT,
  continent TEXT,
  climate TEXT,
  iso_a3 TEXT,
  model_series INTEGER REFERENCES model_series(id),
  var TEXT,
  val REAL,
  descr TEXT,
  cnt_vhcl INTEGER
);

CREATE INDEX IF NOT EXISTS idx_battery_data_country ON battery_data(country);
CREATE INDEX IF NOT EXISTS idx_battery_data_var ON battery_data(var);
"#;

/// Tables created by [`DDL`], in creation order.
pub const TABLES: &[&str] = &["model_series", "battery_data"];
