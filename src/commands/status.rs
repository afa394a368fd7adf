//! `greenstack status` - recorded resources and whether the provider still has them

use anyhow::Result;
use colored::Colorize;
use declarative::{AppliedState, Provider};
use rayon::prelude::*;

use super::Session;
use crate::Context;
use crate::ui;

/// Whether the provider still holds a recorded resource.
///
/// Only existence is checked; attribute values are not compared.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Presence {
    Present,
    Missing,
    Unreadable(String),
}

/// Read every recorded resource from the provider, in parallel
pub fn refresh<P: Provider + ?Sized>(state: &AppliedState, provider: &P) -> Vec<(String, Presence)> {
    state
        .resources
        .par_iter()
        .map(|(id, resource)| {
            let presence = match provider.read(resource.kind, &resource.physical_id) {
                Ok(Some(_)) => Presence::Present,
                Ok(None) => Presence::Missing,
                Err(e) => Presence::Unreadable(e.to_string()),
            };
            (id.clone(), presence)
        })
        .collect()
}

pub fn run(ctx: &Context, refresh_from_provider: bool) -> Result<()> {
    let session = Session::open(ctx)?;
    let state = session.load_state()?;
    let provider = session.provider();

    ui::header(&format!("{} Status", session.stack.name));
    ui::kv("Target", &session.target.to_string());
    ui::kv(
        "State",
        &session
            .store
            .path_for(&session.stack.name, &session.target)
            .display()
            .to_string(),
    );
    ui::kv(
        "Provider",
        &format!("{} ({})", provider.name(), provider.root().display()),
    );

    if state.is_empty() {
        ui::kv("Resources", &"Nothing applied yet".yellow().to_string());
        ui::dim("Run: greenstack apply");
        println!();
        return Ok(());
    }

    ui::kv(
        "Last updated",
        &state.last_updated.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    ui::kv("Resources", &state.len().to_string());

    let presence = if refresh_from_provider {
        let pb = crate::progress::spinner(&format!("Reading from {} provider...", provider.name()));
        let presence = refresh(&state, &provider);
        pb.finish_and_clear();
        ui::info(&format!("Read {} resources", presence.len()));
        Some(presence)
    } else {
        None
    };

    ui::section("Applied resources");
    for id in state.teardown_order().iter().rev() {
        let Some(resource) = state.get(id) else {
            continue;
        };
        let marker = match presence
            .as_ref()
            .and_then(|p| p.iter().find(|(p_id, _)| p_id == id))
            .map(|(_, p)| p)
        {
            None | Some(Presence::Present) => "✓".green().to_string(),
            Some(Presence::Missing) => "✗".red().to_string(),
            Some(Presence::Unreadable(_)) => "?".yellow().to_string(),
        };
        println!(
            "  {} {:<28} {:<11} {}",
            marker,
            id,
            resource.kind.to_string().dimmed(),
            ui::truncate(&resource.physical_id, 24)
        );
    }

    if let Some(presence) = presence {
        let missing = presence
            .iter()
            .filter(|(_, p)| *p == Presence::Missing)
            .count();
        println!();
        if missing == 0 {
            ui::success("Every recorded resource is present");
        } else {
            ui::warn(&format!(
                "{missing} resources are recorded but missing from the {} provider",
                provider.name()
            ));
        }
        for (id, p) in &presence {
            if let Presence::Unreadable(error) = p {
                ui::error(&format!("{id}: {error}"));
            }
        }
    }

    println!();
    Ok(())
}
