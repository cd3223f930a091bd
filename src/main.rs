use clap::builder::TypedValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use humansize::{DECIMAL, format_size};
use species_harvester::{
    ClientConfig, DEFAULT_IMAGE_COUNT, DEFAULT_OUTPUT_ROOT, HarvestConfig, ListingOptions,
    ObservationOrder, PhotoSize, ProgressEvent, QualityGrade, SpeciesOutcome, SpeciesRequest,
    SpeciesStatus, harvest,
};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Download per-species image datasets from iNaturalist observations
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Comma-separated common or scientific names, e.g. "Giant Panda, Panthera leo"
    #[arg(long)]
    species: String,

    /// Images to download per species
    #[arg(long = "num_images", visible_alias = "num-images", default_value_t = DEFAULT_IMAGE_COUNT)]
    num_images: usize,

    /// Dataset root; one subfolder per species is created inside
    #[arg(long, short, default_value = DEFAULT_OUTPUT_ROOT)]
    output: PathBuf,

    /// Photo size to download
    #[arg(long, value_enum, default_value_t = SizeArg::Medium)]
    photo_size: SizeArg,

    /// Only use observations of this quality grade
    #[arg(long, value_enum, default_value_t = GradeArg::Research)]
    quality_grade: GradeArg,

    /// Observation ordering
    #[arg(long, value_enum, default_value_t = OrderArg::Votes)]
    order_by: OrderArg,

    /// Observations per API page (1-200, defaults to the image count)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=200))]
    per_page: Option<u32>,

    /// Take at most this many photos from one observation
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..).map(|n| n as usize))]
    photos_per_observation: Option<usize>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Minimum delay between API calls in milliseconds
    #[arg(long, default_value_t = 1000)]
    request_delay_ms: u64,

    /// Retries after a transient API failure
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SizeArg {
    Square,
    Small,
    Medium,
    Large,
    Original,
}

impl From<SizeArg> for PhotoSize {
    fn from(value: SizeArg) -> Self {
        match value {
            SizeArg::Square => PhotoSize::Square,
            SizeArg::Small => PhotoSize::Small,
            SizeArg::Medium => PhotoSize::Medium,
            SizeArg::Large => PhotoSize::Large,
            SizeArg::Original => PhotoSize::Original,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GradeArg {
    Research,
    #[value(name = "needs_id", alias = "needs-id")]
    NeedsId,
    Casual,
    Any,
}

impl From<GradeArg> for QualityGrade {
    fn from(value: GradeArg) -> Self {
        match value {
            GradeArg::Research => QualityGrade::Research,
            GradeArg::NeedsId => QualityGrade::NeedsId,
            GradeArg::Casual => QualityGrade::Casual,
            GradeArg::Any => QualityGrade::Any,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrderArg {
    Votes,
    #[value(name = "created_at", alias = "created-at")]
    CreatedAt,
    #[value(name = "observed_on", alias = "observed-on")]
    ObservedOn,
    Id,
}

impl From<OrderArg> for ObservationOrder {
    fn from(value: OrderArg) -> Self {
        match value {
            OrderArg::Votes => ObservationOrder::Votes,
            OrderArg::CreatedAt => ObservationOrder::CreatedAt,
            OrderArg::ObservedOn => ObservationOrder::ObservedOn,
            OrderArg::Id => ObservationOrder::Id,
        }
    }
}

impl Cli {
    fn harvest_config(&self) -> HarvestConfig {
        HarvestConfig {
            output_root: self.output.clone(),
            client: ClientConfig {
                timeout: Duration::from_secs(self.timeout),
                request_delay: Duration::from_millis(self.request_delay_ms),
                retries: self.retries,
                ..ClientConfig::default()
            },
            listing: ListingOptions {
                per_page: self.per_page,
                photo_size: self.photo_size.into(),
                quality_grade: self.quality_grade.into(),
                order_by: self.order_by.into(),
                max_photos_per_observation: self.photos_per_observation,
            },
        }
    }
}

/// Installs the stderr log subscriber; `RUST_LOG` overrides `-v`
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("species_harvester={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles progress events and prints formatted output to stdout
fn handle_progress_event(event: ProgressEvent) {
    match event {
        ProgressEvent::Started {
            root,
            species_count,
        } => {
            println!(
                "Harvesting images for {} species into {}",
                species_count,
                root.display()
            );
            println!("\n=== Resolving Species ===");
        }
        ProgressEvent::ResolvingSpecies { .. } => {}
        ProgressEvent::SpeciesResolved { name, taxon } => {
            match taxon.common_name {
                Some(common) => println!(
                    "'{}' -> {} ({}, taxon {})",
                    name, taxon.scientific_name, common, taxon.id
                ),
                None => println!("'{}' -> {} (taxon {})", name, taxon.scientific_name, taxon.id),
            }
        }
        ProgressEvent::SpeciesMerged {
            name,
            scientific_name,
        } => {
            println!("'{}' -> {} (already requested, merged)", name, scientific_name);
        }
        ProgressEvent::SpeciesNotFound { name } => {
            println!("'{}' -> not found, skipping", name);
        }
        ProgressEvent::ResolutionFailed { name, reason } => {
            eprintln!("'{}' -> lookup failed: {}", name, reason);
        }
        ProgressEvent::ListingPhotos {
            index,
            total,
            scientific_name,
            requested,
        } => {
            println!(
                "\n[{}/{}] {}: listing up to {} photo(s)...",
                index + 1,
                total,
                scientific_name,
                requested
            );
        }
        ProgressEvent::PhotosListed {
            listed, requested, ..
        } => {
            if listed < requested {
                println!("  Only {} of {} photo(s) available", listed, requested);
            } else {
                println!("  Found {} photo(s)", listed);
            }
        }
        ProgressEvent::ListingFailed { reason, .. } => {
            eprintln!("  Listing failed: {}", reason);
        }
        ProgressEvent::DownloadingImage { .. } => {}
        ProgressEvent::ImageSaved { path, bytes } => {
            println!("  Saved {} ({})", path.display(), format_size(bytes, DECIMAL));
        }
        ProgressEvent::DownloadFailed { url, reason } => {
            eprintln!("  Skipped {}: {}", url, reason);
        }
        ProgressEvent::SpeciesFinished { .. } => {}
        ProgressEvent::Complete {
            species_count,
            image_count,
        } => {
            println!(
                "\nHarvest complete! Saved {} image(s) across {} species.",
                image_count, species_count
            );
        }
    }
}

/// One summary line per species: requested vs. achieved
fn summary_line(outcome: &SpeciesOutcome) -> String {
    let inputs = outcome.inputs.join(", ");
    let name = outcome
        .taxon
        .as_ref()
        .map(|t| t.scientific_name.as_str())
        .unwrap_or(inputs.as_str());

    match &outcome.status {
        SpeciesStatus::NotFound => format!("{}: not found", inputs),
        SpeciesStatus::Failed(reason) => format!("{}: failed ({})", name, reason),
        SpeciesStatus::Completed | SpeciesStatus::Partial => {
            let mut line = format!(
                "{}: {}/{} image(s), {}",
                name,
                outcome.achieved,
                outcome.requested,
                format_size(outcome.bytes_written, DECIMAL)
            );
            if outcome.shortfall() > 0 {
                line.push_str(&format!(" (shortfall {}", outcome.shortfall()));
                if outcome.failed_downloads > 0 {
                    line.push_str(&format!(", {} failed download(s)", outcome.failed_downloads));
                }
                line.push(')');
            }
            if outcome.status == SpeciesStatus::Partial {
                line.push_str(" [partial]");
            }
            line
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let requests = SpeciesRequest::parse_list(&cli.species, cli.num_images);
    if requests.is_empty() {
        eprintln!("Error: --species did not contain any species names");
        process::exit(2);
    }

    let config = cli.harvest_config();

    match harvest(&requests, &config, handle_progress_event) {
        Ok(report) => {
            println!("\n=== Summary ===\n");
            for outcome in &report.outcomes {
                println!("{}", summary_line(outcome));
            }

            if report.all_failed() {
                eprintln!("\nNo species could be processed.");
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("\nError during harvest: {}", e);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photos_per_observation_must_be_positive() {
        let result = Cli::try_parse_from([
            "species-harvester",
            "--species",
            "Panthera leo",
            "--photos-per-observation",
            "0",
        ]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "species-harvester",
            "--species",
            "Panthera leo",
            "--photos-per-observation",
            "2",
        ])
        .unwrap();
        assert_eq!(cli.harvest_config().listing.max_photos_per_observation, Some(2));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["species-harvester", "--species", "Panthera leo"]).unwrap();
        assert_eq!(cli.num_images, DEFAULT_IMAGE_COUNT);
        assert_eq!(cli.harvest_config().listing.max_photos_per_observation, None);
    }
}
