use anyhow::{Context, Result};
use chrono::Datelike;
use std::path::PathBuf;

use tempcast::config::Config;
use tempcast::prediction::export::export_forecast;
use tempcast::prediction::forecast::{forecast_month, MONTH_NAMES};
use tempcast::registry::{is_standard, ModelRecord};
use tempcast::training::trainer::FitPhase;
use tempcast::training::worker::{TrainingEvent, TrainingJob, TrainingWorker};
use tempcast::utils::input::{get_input, get_line, get_line_or};
use tempcast::utils::plot::{plot_forecast, plot_loss_curve};
use tempcast::{forecast_year, telemetry, ModelCatalog, ModelRegistry, ModelStore, TrainingOptions};

fn main() -> Result<()> {
    let cfg = Config::load()?;
    telemetry::init_tracing(&cfg.log_filter);

    let store = ModelStore::new(&cfg.models_dir);
    store.ensure_directory()?;
    let registry = ModelRegistry::new(&cfg.registry_file);
    let mut catalog = registry
        .list_models()
        .with_context(|| format!("reading {}", registry.path().display()))?;

    show_current_month(&store);

    loop {
        let records = catalog.records();
        println!("\nModels:");
        for (i, record) in records.iter().enumerate() {
            let state = if store.has_model(&record.id) { "trained" } else { "untrained" };
            println!("  {}. {} [{}] - {}", i + 1, record.name, state, record.description);
        }
        println!("\n1) Train  2) Predict  3) Add model  4) Rename  5) Delete  6) Export  0) Quit");

        let choice: u32 = get_input("> ")?;
        let result = match choice {
            0 => return Ok(()),
            1 => pick(&records).map_or(Ok(()), |r| train(&cfg, &store, r)),
            2 => pick(&records).map_or(Ok(()), |r| predict(&cfg, &store, r)),
            3 => add_model(&store, &registry, &catalog).map(|next| catalog = next),
            4 => match pick(&records) {
                Some(r) => rename(&registry, &catalog, r).map(|next| catalog = next),
                None => Ok(()),
            },
            5 => match pick(&records) {
                Some(r) => delete(&store, &registry, &catalog, r).map(|next| catalog = next),
                None => Ok(()),
            },
            6 => pick(&records).map_or(Ok(()), |r| export_model(&store, r)),
            _ => {
                println!("Unknown option");
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("Error: {e:#}");
        }
    }
}

fn pick(records: &[ModelRecord]) -> Option<&ModelRecord> {
    let index: usize = get_input("Model number: ").ok()?;
    let record = index.checked_sub(1).and_then(|i| records.get(i));
    if record.is_none() {
        println!("No such model");
    }
    record
}

fn show_current_month(store: &ModelStore) {
    let today = chrono::Local::now().date_naive();
    match forecast_month(store, tempcast::STANDARD_MODEL_ID, today.year(), today.month()) {
        Ok(t) => println!(
            "{} {}: {:.1}°C expected",
            MONTH_NAMES[today.month0() as usize],
            today.year(),
            t
        ),
        Err(_) => println!("Current month forecast unavailable: standard model is not trained"),
    }
}

fn train(cfg: &Config, store: &ModelStore, record: &ModelRecord) -> Result<()> {
    let default_data = cfg.standard_training_data.display().to_string();
    let data_path = get_line_or(&format!("Historical data file [{default_data}]: "), &default_data)?;
    let epochs = loop {
        let input = get_line(&format!("Epochs [{}]: ", cfg.default_epochs))?;
        match parse_epochs(&input, cfg.default_epochs) {
            Some(n) => break n,
            None => println!("Please enter a positive whole number"),
        }
    };

    let worker = TrainingWorker::spawn(
        store.clone(),
        TrainingJob {
            model_id: record.id.clone(),
            data_path: PathBuf::from(data_path),
            options: TrainingOptions::new(epochs),
        },
    )?;

    println!("Training {} for {} epochs...", record.name, epochs);
    let outcome = loop {
        let Ok(event) = worker.events().recv() else {
            break worker.wait()?;
        };
        match event {
            TrainingEvent::Epoch { phase, epoch, loss } => {
                let epoch = epoch + 1;
                if epoch % 10 == 0 || epoch == epochs {
                    let label = match phase {
                        FitPhase::Train => "fit",
                        FitPhase::Refit => "refit",
                    };
                    println!("{label} epoch {epoch}/{epochs} - loss: {loss:.5}");
                }
            }
            TrainingEvent::Finished(result) => break result?,
        }
    };

    println!(
        "Done. Test MAE {:.3}°C, MSE {:.3}",
        outcome.evaluation.mae, outcome.evaluation.mse
    );

    std::fs::create_dir_all(&cfg.plots_dir)?;
    let plot = cfg.plots_dir.join(format!("loss_{}.png", record.id));
    plot_loss_curve(&outcome.history, &plot)?;
    println!("Loss curve written to {}", plot.display());
    Ok(())
}

/// Empty input takes the default; anything else must be a positive integer.
fn parse_epochs(input: &str, default: usize) -> Option<usize> {
    if input.is_empty() {
        return Some(default);
    }
    input.parse().ok().filter(|&n| n > 0)
}

fn predict(cfg: &Config, store: &ModelStore, record: &ModelRecord) -> Result<()> {
    let year: i32 = get_input("Year: ")?;
    let forecast = match forecast_year(store, &record.id, year) {
        Ok(f) => f,
        Err(tempcast::ForecastError::Untrained(_)) => {
            println!("{} has not been trained yet", record.name);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    forecast.display();

    std::fs::create_dir_all(&cfg.plots_dir)?;
    let chart = cfg.plots_dir.join(format!("forecast_{}_{}.png", record.id, year));
    plot_forecast(&forecast, &chart)?;
    println!("Chart written to {}", chart.display());

    let target = get_line("Save to file (empty to skip): ")?;
    if !target.is_empty() {
        let written = export_forecast(&forecast, &target)?;
        println!("Saved {}", written.display());
    }
    Ok(())
}

fn add_model(store: &ModelStore, registry: &ModelRegistry, catalog: &ModelCatalog) -> Result<ModelCatalog> {
    let source = get_line("Network file to import: ")?;
    let id = store.import(&source)?;
    let name = get_line("Name: ")?;
    let description = get_line("Description: ")?;
    let next = catalog.with_model(&id, &name, &description)?;
    registry.save_metadata(&next)?;
    println!("Added model {id}");
    Ok(next)
}

fn rename(registry: &ModelRegistry, catalog: &ModelCatalog, record: &ModelRecord) -> Result<ModelCatalog> {
    if is_standard(&record.id) {
        println!("The standard model cannot be renamed");
        return Ok(catalog.clone());
    }
    let name = get_line_or(&format!("Name [{}]: ", record.name), &record.name)?;
    let description = get_line("Description: ")?;
    let next = catalog.renamed(&record.id, &name, &description)?;
    registry.save_metadata(&next)?;
    Ok(next)
}

fn delete(
    store: &ModelStore,
    registry: &ModelRegistry,
    catalog: &ModelCatalog,
    record: &ModelRecord,
) -> Result<ModelCatalog> {
    if is_standard(&record.id) {
        println!("The standard model cannot be deleted");
        return Ok(catalog.clone());
    }
    store.delete(&record.id)?;
    let next = catalog.without(&record.id)?;
    registry.save_metadata(&next)?;
    println!("Deleted {}", record.name);
    Ok(next)
}

fn export_model(store: &ModelStore, record: &ModelRecord) -> Result<()> {
    let target = get_line("Export to: ")?;
    let written = store.export(&record.id, &target)?;
    println!("Exported to {}", written.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::parse_epochs;
    use rstest::rstest;

    #[rstest]
    #[case("", Some(200))]
    #[case("50", Some(50))]
    #[case("5O", None)]
    #[case("0", None)]
    #[case("-3", None)]
    fn epoch_input(#[case] input: &str, #[case] expected: Option<usize>) {
        assert_eq!(parse_epochs(input, 200), expected);
    }
}
