use std::env::current_dir;
use std::path::Path;

use anyhow::Error;
use console::{Term, style};
use dialoguer::{Input, Select};

use crate::index_of::IndexOfConnector;
use crate::index_of::interrupt::InterruptHandler;
use crate::index_of::io::Config;
use crate::index_of::io::catalog::{Catalog, CatalogEntry, parse_selection};
use crate::index_of::io::directory::output_directory;
use crate::index_of::listing::project_name;
use crate::index_of::tui::link::{EnvLinkCapability, LinkCapability, render_link};
use crate::index_of::tui::{clear_below_banner, print_banner};

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

/// What the main menu offers.
enum MenuChoice {
    CustomUrl,
    Catalog(usize),
    Exit,
}

/// A program class that handles the flow of the downloader user experience and steps of execution.
pub(crate) struct Program;

impl Program {
    /// Creates a new instance of the program.
    pub(crate) fn new() -> Self {
        Self
    }

    /// Runs the downloader program.
    pub(crate) fn run(&self) -> Result<(), Error> {
        Term::stdout().set_title("Index Of downloader");
        trace!("Starting Index Of downloader...");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Authors: {}", AUTHORS);
        let working_dir = current_dir().map_err(|e| {
            error!("Unable to get working directory: {}", e);
            anyhow::anyhow!("Failed to get working directory: {}", e)
        })?;
        trace!("Program Working Directory: {}", working_dir.display());

        trace!("Checking if config file exists...");
        if !Config::config_exists() {
            trace!("Config file doesn't exist...");
            info!("Creating config file...");
            Config::create_config()?;
        }

        let config = Config::get();
        for path in config.create_missing_catalogs()? {
            info!("Created example catalog {}. Edit it to add your own listings.", path.display());
        }

        let catalogs = load_catalogs(config);
        let connector = IndexOfConnector::new(config, InterruptHandler::install())?;
        let links = EnvLinkCapability::new();

        clear_below_banner();
        loop {
            match main_menu(&catalogs) {
                MenuChoice::CustomUrl => download_custom_url(&connector, config),
                MenuChoice::Catalog(index) => {
                    download_from_catalog(&connector, config, &catalogs[index], &links)
                }
                MenuChoice::Exit => {
                    if connector.confirm_exit("No more listings queued.") {
                        info!("Exiting at user request...");
                        break;
                    }
                    clear_below_banner();
                }
            }
        }

        Ok(())
    }
}

/// Loads every configured catalog, skipping the ones that fail with a warning.
fn load_catalogs(config: &Config) -> Vec<Catalog> {
    config
        .catalogs()
        .iter()
        .filter_map(|source| match Catalog::load(&source.name, Path::new(&source.file)) {
            Ok(catalog) => Some(catalog),
            Err(e) => {
                warn!("Skipping catalog \"{}\": {}", source.name, e);
                None
            }
        })
        .collect()
}

/// Shows the main menu. A failed prompt counts as choosing to exit.
fn main_menu(catalogs: &[Catalog]) -> MenuChoice {
    let mut items = vec![String::from("Download from an 'Index Of' URL")];
    items.extend(
        catalogs
            .iter()
            .map(|catalog| format!("Browse {} ({} listings)", catalog.name(), catalog.entries().len())),
    );
    items.push(String::from("Exit"));

    let selection = Select::new()
        .with_prompt("What would you like to do?")
        .default(0)
        .items(&items)
        .interact();

    match selection {
        Ok(0) => MenuChoice::CustomUrl,
        Ok(i) if i <= catalogs.len() => MenuChoice::Catalog(i - 1),
        Ok(_) => MenuChoice::Exit,
        Err(e) => {
            warn!("Menu prompt failed: {}", e);
            MenuChoice::Exit
        }
    }
}

/// Prompts for a listing URL and a save path, then downloads it.
fn download_custom_url(connector: &IndexOfConnector, config: &Config) {
    let url: String = match Input::new().with_prompt("Enter 'Index Of' URL").interact_text() {
        Ok(url) => url,
        Err(e) => {
            warn!("Failed to get user input: {}", e);
            return;
        }
    };
    let url = url.trim().to_string();

    let default_name = project_name(&url);
    let save_path: String = Input::new()
        .with_prompt("Enter the path to save files")
        .default(default_name.clone())
        .interact_text()
        .unwrap_or(default_name);

    let dest_dir = output_directory(config.download_directory(), &save_path);
    run_listing(connector, &url, &dest_dir);
}

/// Lists a catalog, asks which entries to download and downloads each one in turn.
fn download_from_catalog(
    connector: &IndexOfConnector,
    config: &Config,
    catalog: &Catalog,
    links: &dyn LinkCapability,
) {
    clear_below_banner();
    println!("{}\n", style(catalog.name()).bold().underlined());
    for entry in catalog.entries() {
        let id = entry.id.map(|id| id.to_string()).unwrap_or_else(|| String::from("-"));
        let url = entry.listing_url().unwrap_or_default();
        println!("  {:>3}. {}", id, render_link(links, &entry.name, url));
    }
    println!();

    let selection: String = match Input::new()
        .with_prompt("Select listings (e.g. all, 1, 1,3,5, 2-4)")
        .allow_empty(true)
        .interact_text()
    {
        Ok(selection) => selection,
        Err(e) => {
            warn!("Failed to get user input: {}", e);
            return;
        }
    };

    let (selected, missing) = parse_selection(&selection, catalog.entries());
    if !missing.is_empty() {
        let ids: Vec<String> = missing.iter().map(u32::to_string).collect();
        warn!("No listing with id {} in {}", ids.join(", "), catalog.name());
    }
    if selected.is_empty() {
        info!("Nothing selected.");
        return;
    }

    print_banner();
    let ran = run_entries(&selected, |entry, url| {
        let dest_dir = output_directory(config.download_directory(), &entry.name);
        run_listing(connector, url, &dest_dir)
    });
    if ran < selected.len() {
        info!("Skipped the remaining {} listings.", selected.len() - ran);
    }
}

/// Runs `run` for each entry with a listing URL until it reports a cancellation.
///
/// Returns how many entries were looked at, including skipped ones.
fn run_entries<F>(entries: &[&CatalogEntry], mut run: F) -> usize
where
    F: FnMut(&CatalogEntry, &str) -> ListingStatus,
{
    for (i, entry) in entries.iter().enumerate() {
        let Some(url) = entry.listing_url() else {
            warn!("\"{}\" has no listing URL, skipping it.", entry.name);
            continue;
        };
        if run(*entry, url) == ListingStatus::Cancelled {
            return i + 1;
        }
    }

    entries.len()
}

/// Whether a listing ran to its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListingStatus {
    Done,
    Cancelled,
}

/// Runs one listing and prints its summary, reporting a failed listing fetch instead.
fn run_listing(connector: &IndexOfConnector, url: &str, dest_dir: &Path) -> ListingStatus {
    if url.is_empty() {
        warn!("No URL given.");
        return ListingStatus::Done;
    }

    match connector.download_listing(url, dest_dir) {
        Ok(outcome) => {
            connector.print_summary(&outcome);
            if outcome.cancelled {
                ListingStatus::Cancelled
            } else {
                ListingStatus::Done
            }
        }
        Err(e) => {
            error!("Could not download listing {}: {:#}", url, e);
            ListingStatus::Done
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, href: &str) -> CatalogEntry {
        CatalogEntry {
            id: Some(id),
            name: format!("Entry {id}"),
            href: href.to_string(),
            path: None,
        }
    }

    #[test]
    fn test_run_entries_stops_after_cancel() {
        let entries = [
            entry(1, "https://example.com/one/"),
            entry(2, "https://example.com/two/"),
            entry(3, "https://example.com/three/"),
        ];
        let selected: Vec<&CatalogEntry> = entries.iter().collect();

        let mut visited = Vec::new();
        let ran = run_entries(&selected, |entry, _| {
            visited.push(entry.id);
            if entry.id == Some(2) {
                ListingStatus::Cancelled
            } else {
                ListingStatus::Done
            }
        });

        assert_eq!(ran, 2);
        assert_eq!(visited, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_run_entries_skips_entries_without_url() {
        let entries = [entry(1, ""), entry(2, "https://example.com/two/")];
        let selected: Vec<&CatalogEntry> = entries.iter().collect();

        let mut urls = Vec::new();
        let ran = run_entries(&selected, |_, url| {
            urls.push(url.to_string());
            ListingStatus::Done
        });

        assert_eq!(ran, 2);
        assert_eq!(urls, vec!["https://example.com/two/"]);
    }
}
