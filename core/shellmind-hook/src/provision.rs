//! `setup`, `train` and `generate-data`.
//!
//! These are the only subcommands allowed to take minutes (model pulls,
//! fine-tuning). Progress goes to stdout; failures exit non-zero.

use shellmind_core::training::{generate_training_data, retrain, CommandTrainer, OllamaCli};
use shellmind_core::{run_setup, Config, Result};

use crate::status::build_probe;

pub fn setup(config: &Config) -> Result<()> {
    let probe = build_probe(config)?;
    let importer = OllamaCli::new(config.service.binary.clone());

    println!("Setting up {} on {}", config.model.name, config.service.url);
    let report = run_setup(config, &probe, &importer)?;

    if report.launched_service {
        println!("Started {} serve", config.service.binary);
    }
    if report.pulled_base {
        println!("Pulled {}", config.model.base_model);
    }
    if report.created_model {
        println!("Created {}", config.model.name);
    } else {
        println!("{} already present", config.model.name);
    }
    println!("Ready. Open a new shell to pick it up.");
    Ok(())
}

pub fn train(config: &Config) -> Result<()> {
    let trainer = CommandTrainer::new(config.training.command.clone(), config.training.timeout());
    let importer = OllamaCli::new(config.service.binary.clone());

    if config.training.command.is_empty() {
        println!("No training command configured; importing {} only", config.model.base_model);
    }
    let report = retrain(config, &trainer, &importer)?;
    println!(
        "Imported {} ({} examples{})",
        config.model.name,
        report.examples,
        if report.fine_tuned { ", fine-tuned" } else { "" }
    );
    Ok(())
}

pub fn generate_data(config: &Config, max: Option<usize>) -> Result<()> {
    let mut config = config.clone();
    if max.is_some() {
        config.training.max_examples = max;
    }
    let written = generate_training_data(&config)?;
    println!(
        "Wrote {} examples to {}",
        written,
        config.storage.training_table_file().display()
    );
    Ok(())
}
