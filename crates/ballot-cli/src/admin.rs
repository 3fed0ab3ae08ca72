// Admin console: a sequential read-execute-print loop over the admin
// controller. Each write waits for the server before the view is redrawn.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use ballot_app::admin::{AdminController, AdminError};
use ballot_app::api::admin::{AdminTransport, AuditLog};
use ballot_app::protocol::{Notice, RenderScope};

use crate::command::{parse_admin_line, AdminCommand, Input, ADMIN_HELP};
use crate::console::{format_audit_log, format_dashboard, format_view, ViewContext};

fn print_view<T: AdminTransport, W: Write>(
    controller: &AdminController<T>,
    out: &mut W,
) -> std::io::Result<()> {
    out.write_all(format_view(&controller.view, RenderScope::Full).as_bytes())?;
    out.write_all(format_dashboard(&controller.dashboard).as_bytes())?;
    out.flush()
}

/// What to print after a command.
enum Step {
    Redraw,
    Audit(AuditLog),
    Exit,
}

async fn execute<T: AdminTransport>(
    controller: &mut AdminController<T>,
    cmd: AdminCommand,
) -> Result<Step, AdminError> {
    match cmd {
        AdminCommand::Refresh => controller.refresh().await?,
        AdminCommand::SelectYear(year) => controller.select_year(year).await?,
        AdminCommand::SelectCategory(category) => controller.select_category(&category).await?,
        AdminCommand::SelectSort(sort) => controller.select_sort(sort),
        AdminCommand::ToggleEventMode => {
            controller.toggle_event_mode().await?;
        }
        AdminCommand::ToggleVotingLock => {
            controller.toggle_voting_lock().await?;
        }
        AdminCommand::ToggleWinner { category, film_id } => {
            controller.toggle_winner(&category, &film_id).await?;
        }
        AdminCommand::SaveBanner { enabled, text } => controller.save_banner(enabled, &text).await?,
        AdminCommand::SaveWatch {
            film_id,
            url,
            free_to_watch,
        } => {
            let poster = controller
                .view
                .snapshot
                .film(&film_id)
                .and_then(|film| film.poster_url.clone())
                .unwrap_or_default();
            controller
                .save_overrides(&film_id, &url, free_to_watch, &poster)
                .await?
        }
        AdminCommand::SavePoster { film_id, url } => {
            let (watch, free) = controller
                .view
                .snapshot
                .film(&film_id)
                .map(|film| (film.where_to_watch_url.clone().unwrap_or_default(), film.free_to_watch))
                .ok_or_else(|| AdminError::UnknownFilm(film_id.clone()))?;
            controller.save_overrides(&film_id, &watch, free, &url).await?
        }
        AdminCommand::ClearWatch(film_id) => controller.clear_watch_override(&film_id).await?,
        AdminCommand::ClearPoster(film_id) => controller.clear_poster(&film_id).await?,
        AdminCommand::AuditLogs(filter) => {
            return Ok(Step::Audit(controller.audit_logs(&filter).await?));
        }
        AdminCommand::Logout => {
            controller.logout().await?;
            return Ok(Step::Exit);
        }
        AdminCommand::Quit => return Ok(Step::Exit),
    }
    Ok(Step::Redraw)
}

/// Start the controller and serve commands from `input` until `quit`,
/// `logout`, end of input, or a lost admin session.
pub async fn run_admin<T, R, W>(
    controller: &mut AdminController<T>,
    input: R,
    mut out: W,
) -> anyhow::Result<()>
where
    T: AdminTransport,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    if let Err(e) = controller.start().await {
        if e.is_auth_required() {
            writeln!(out, "! {}", Notice::LoginRequired)?;
            return Ok(());
        }
        return Err(e.into());
    }
    print_view(controller, &mut out)?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let ctx = ViewContext::from_view(&controller.view);
        let cmd = match parse_admin_line(&line, &ctx) {
            Ok(Some(Input::Command(cmd))) => cmd,
            Ok(Some(Input::Help)) => {
                out.write_all(ADMIN_HELP.as_bytes())?;
                continue;
            }
            Ok(None) => continue,
            Err(e) => {
                writeln!(out, "? {e}")?;
                continue;
            }
        };

        match execute(controller, cmd).await {
            Ok(Step::Redraw) => print_view(controller, &mut out)?,
            Ok(Step::Audit(log)) => out.write_all(format_audit_log(&log).as_bytes())?,
            Ok(Step::Exit) => break,
            Err(e) if e.is_auth_required() => {
                warn!("Admin session lost");
                writeln!(out, "! {}", Notice::LoginRequired)?;
                break;
            }
            Err(e) => writeln!(out, "! {e}")?,
        }
    }

    info!("Admin console closed");
    Ok(())
}
