//! `thunt manager` subcommands.

use super::parser::ManagerAction;
use crate::{
    manager::HuntManager,
    treasure::TreasureRecord,
};
use anyhow::Result;
use std::io::Write;

fn write_details(out: &mut impl Write, record: &TreasureRecord) -> std::io::Result<()> {
    writeln!(out, "  ID        : {}", record.id)?;
    writeln!(out, "  Username  : {}", record.owner)?;
    writeln!(out, "  Latitude  : {:.6}", record.latitude)?;
    writeln!(out, "  Longitude : {:.6}", record.longitude)?;
    writeln!(out, "  Clue      : {}", record.note)?;
    writeln!(out, "  Value     : {}", record.value)
}

pub fn run_manager(manager: &HuntManager, action: ManagerAction, out: &mut impl Write) -> Result<()> {
    match action {
        ManagerAction::Add {
            hunt,
            id,
            owner,
            latitude,
            longitude,
            note,
            value,
        } => {
            let record = TreasureRecord::new(id, owner, latitude, longitude, note, value)?;
            manager.add_treasure(&hunt, &record)?;
            writeln!(out, "Treasure added successfully.")?;
        }
        ManagerAction::List { hunt } => {
            let listing = manager.list_treasures(&hunt)?;
            writeln!(out, "Hunt: {hunt}")?;
            writeln!(out, "Total file size: {} bytes", listing.size.bytes)?;
            if listing.scan.records.is_empty() {
                writeln!(out, "No treasures found in hunt '{hunt}'.")?;
            } else {
                writeln!(out, "\nTreasure List:")?;
                for (n, record) in listing.scan.records.iter().enumerate() {
                    writeln!(out, "Treasure #{}:", n + 1)?;
                    write_details(out, record)?;
                    writeln!(out)?;
                }
            }
            if let Some(corruption) = listing.scan.corruption {
                eprintln!(
                    "Incomplete record read ({} trailing bytes). File may be corrupted.",
                    corruption.trailing_bytes
                );
            }
        }
        ManagerAction::View { hunt, id } => {
            let record = manager.view_treasure(&hunt, id)?;
            writeln!(out, "Treasure Details:")?;
            write_details(out, &record)?;
        }
        ManagerAction::RemoveTreasure { hunt, id } => {
            manager.remove_treasure(&hunt, id)?;
            writeln!(out, "Treasure with ID {id} removed successfully.")?;
        }
        ManagerAction::RemoveHunt { hunt } => {
            manager.remove_hunt(&hunt)?;
            writeln!(out, "Successfully removed hunt '{hunt}' and its log alias.")?;
        }
    }
    Ok(())
}
