use std::process::ExitCode;

use tracing::{error, info, warn};

use campus_events_lib::{
    dates,
    llm::OpenAiChat,
    pipeline::{Pipeline, PipelineOutcome},
    scraping::{self, base::HttpFetcher},
    Settings, Variant,
};

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    campus_events_lib::init_tracing(std::io::stdout);

    let settings = Settings::load_or_default(Variant::Cli);

    let completion = match settings
        .completion_config()
        .map_err(|err| err.to_string())
        .and_then(|config| OpenAiChat::new(config).map_err(|err| err.to_string()))
    {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "failed to initialize OpenAI client");
            return ExitCode::FAILURE;
        }
    };

    // Only a missing completion client is fatal; every other failure is
    // reported and the run still exits cleanly.
    let fetcher = match HttpFetcher::new() {
        Ok(fetcher) => fetcher,
        Err(err) => {
            error!(step = "scraping", error = %format!("{err:#}"), "failed to build HTTP client");
            return ExitCode::SUCCESS;
        }
    };

    let site = scraping::default_site();
    let pipeline = Pipeline {
        site: site.as_ref(),
        fetcher: &fetcher,
        completion: &completion,
        policy: settings.batch_policy(),
        collect: settings.collect_options(settings.audience),
    };

    match pipeline.run(dates::today()) {
        Ok(PipelineOutcome::Empty { message, .. }) => info!("{message} Exiting."),
        Ok(PipelineOutcome::Enriched(report)) => {
            println!("\n--- Formatted Events (Raw String from OpenAI) ---");
            println!("{}", report.enrichment.raw_response);
            println!("--- End Raw String ---");

            match serde_json::to_string_pretty(&report.enrichment.batch.to_value()) {
                Ok(pretty) => {
                    println!("\n--- Parsed Events ---");
                    println!("{pretty}");
                }
                Err(err) => warn!(error = %err, "could not pretty-print result"),
            }
            info!(
                total_scraped = report.total_scraped,
                filtered = report.filtered_for_formatting,
                sent = report.sent(),
                received = ?report.received(),
                "done"
            );
        }
        Err(err) => {
            error!(step = err.step(), error = %err, "pipeline failed");
            if let Some(raw) = err.raw_response() {
                println!("\n--- Raw String from OpenAI ---\n{raw}\n--- End Raw String ---");
            }
        }
    }

    ExitCode::SUCCESS
}
