//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use grid_processor::QueryParams;

/// EDR query tool
#[derive(Parser, Debug)]
#[command(name = "edr-query")]
#[command(about = "Answer EDR position and area queries against a local Zarr store")]
pub struct Args {
    /// Path to the Zarr store
    #[arg(short, long, env = "EDR_STORE_PATH")]
    pub store: PathBuf,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Sample the grid cell nearest to a point
    Position(QueryArgs),

    /// Sample every grid cell inside a polygon or bbox
    Area(QueryArgs),

    /// Print collection metadata
    Collection {
        /// Base URL used for links and data query hrefs
        #[arg(long, default_value = "http://localhost:8083/edr")]
        base_url: String,
    },
}

impl Command {
    /// Request path and query string, used as the exception `instance`.
    pub fn instance(&self) -> String {
        match self {
            Command::Position(query) => format!("position?{}", query.query_string()),
            Command::Area(query) => format!("area?{}", query.query_string()),
            Command::Collection { .. } => "collection".to_string(),
        }
    }
}

#[derive(ClapArgs, Debug, Clone, PartialEq)]
pub struct QueryArgs {
    /// Geometry: POINT(lon lat), POLYGON((...)) or minLon,minLat,maxLon,maxLat
    #[arg(long)]
    pub coords: String,

    /// Instant or interval, e.g. 2024-01-01T00:00:00Z/..
    #[arg(long)]
    pub datetime: Option<String>,

    /// Single field to return
    #[arg(long = "parameter-name")]
    pub parameter_name: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Geojson)]
    pub format: OutputFormat,
}

impl QueryArgs {
    fn query_string(&self) -> String {
        let mut pairs = vec![format!("coords={}", self.coords)];
        if let Some(datetime) = &self.datetime {
            pairs.push(format!("datetime={}", datetime));
        }
        if let Some(name) = &self.parameter_name {
            pairs.push(format!("parameter-name={}", name));
        }
        pairs.join("&")
    }

    pub fn to_params(&self) -> QueryParams {
        QueryParams {
            coords: self.coords.clone(),
            datetime: self.datetime.clone(),
            parameter_name: self.parameter_name.clone(),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// EDR GeoJSON FeatureCollection
    Geojson,
    /// Flat array of records
    Records,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_area_command() {
        let args = Args::try_parse_from([
            "edr-query",
            "--store",
            "/data/waves.zarr",
            "area",
            "--coords",
            "-70,40,-60,45",
            "--parameter-name",
            "swh",
            "--format",
            "records",
        ])
        .unwrap();

        assert_eq!(args.store, PathBuf::from("/data/waves.zarr"));
        let Command::Area(query) = args.command else {
            panic!("expected area command");
        };
        assert_eq!(query.format, OutputFormat::Records);

        let params = query.to_params();
        assert_eq!(params.coords, "-70,40,-60,45");
        assert_eq!(params.parameter_name.as_deref(), Some("swh"));
        assert!(params.datetime.is_none());

        assert_eq!(
            Command::Area(query).instance(),
            "area?coords=-70,40,-60,45&parameter-name=swh"
        );
    }

    #[test]
    fn test_coords_are_required() {
        assert!(Args::try_parse_from(["edr-query", "--store", "x", "position"]).is_err());
    }
}
