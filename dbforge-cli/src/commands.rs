//! One handler per [`crate::cli::Command`] variant.
//!
//! Each verb gets its own small handler function, taking parsed config and returning
//! `anyhow::Result<()>`, calling into [`dbforge_core::Engine`].

use anyhow::{bail, Context, Result};
use dbforge_core::{driver_for, Engine, EngineConfig, LogSink};

pub fn new_migration(config: EngineConfig, name: &str) -> Result<()> {
    let engine = Engine::new(config);
    let filename = engine.new_migration(name)?;
    println!("created {filename}");
    Ok(())
}

pub fn up(config: EngineConfig) -> Result<()> {
    let mut log = LogSink::stdout();
    let driver = driver_for(config.driver.clone())?;
    let wait_before = config.wait_before;
    let engine = Engine::new(config);
    if wait_before {
        engine.wait(driver.as_ref(), &mut log)?;
    }
    engine.create_and_migrate(driver.as_ref(), &mut log)?;
    Ok(())
}

pub fn create(config: EngineConfig) -> Result<()> {
    let mut log = LogSink::stdout();
    let driver = driver_for(config.driver.clone())?;
    let wait_before = config.wait_before;
    let engine = Engine::new(config);
    if wait_before {
        engine.wait(driver.as_ref(), &mut log)?;
    }
    engine.create(driver.as_ref(), &mut log)?;
    Ok(())
}

pub fn drop(config: EngineConfig) -> Result<()> {
    let mut log = LogSink::stdout();
    let driver = driver_for(config.driver.clone())?;
    let engine = Engine::new(config);
    engine.drop(driver.as_ref(), &mut log)?;
    Ok(())
}

pub fn migrate(config: EngineConfig) -> Result<()> {
    let mut log = LogSink::stdout();
    let driver = driver_for(config.driver.clone())?;
    let wait_before = config.wait_before;
    let engine = Engine::new(config);
    if wait_before {
        engine.wait(driver.as_ref(), &mut log)?;
    }
    let applied = engine.migrate(driver.as_ref(), &mut log).context("migration failed")?;
    for migration in &applied {
        println!("applied {migration}");
    }
    Ok(())
}

pub fn rollback(config: EngineConfig) -> Result<()> {
    let mut log = LogSink::stdout();
    let driver = driver_for(config.driver.clone())?;
    let engine = Engine::new(config);
    let migration = engine.rollback(driver.as_ref(), &mut log).context("rollback failed")?;
    println!("rolled back {migration}");
    Ok(())
}

pub fn status(config: EngineConfig, exit_code: bool) -> Result<()> {
    let driver = driver_for(config.driver.clone())?;
    let engine = Engine::new(config);
    let migrations = engine.status(driver.as_ref())?;

    let mut pending = 0usize;
    for migration in &migrations {
        let marker = if migration.applied() { "applied" } else { "pending" };
        println!("{marker}\t{migration}");
        if !migration.applied() {
            pending += 1;
        }
    }
    println!("\n{pending} pending migration(s)");

    if exit_code && pending > 0 {
        bail!("{pending} pending migration(s)");
    }
    Ok(())
}

pub fn dump(config: EngineConfig) -> Result<()> {
    let mut log = LogSink::stdout();
    let driver = driver_for(config.driver.clone())?;
    let engine = Engine::new(config);
    engine.dump(driver.as_ref(), &mut log)?;
    Ok(())
}

pub fn wait(config: EngineConfig) -> Result<()> {
    let mut log = LogSink::stdout();
    let driver = driver_for(config.driver.clone())?;
    let engine = Engine::new(config);
    engine.wait(driver.as_ref(), &mut log)?;
    println!("database is ready");
    Ok(())
}
