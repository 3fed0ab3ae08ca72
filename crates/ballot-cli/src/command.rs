// Line-oriented command parsing for the viewer and admin consoles.
//
// Parsing is pure: it turns one input line into a command, using the last
// rendered `ViewContext` to resolve category numbers and the category a pick
// applies to.

use thiserror::Error;

use ballot_app::api::admin::{AuditFilter, AuditOutcome};
use ballot_app::protocol::UserCommand;
use ballot_core::model::{SortOrder, ALL_CATEGORIES};

use crate::console::ViewContext;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("no category matches `{0}`")]
    UnknownCategory(String),

    #[error("choose a category first (category <n>)")]
    NoCategory,
}

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input<C> {
    Command(C),
    Help,
}

pub const USER_HELP: &str = "\
Commands:
  seen <film>           toggle seen for a film
  pick <film>           toggle My Pick in the current category
  year <year>           switch ceremony year
  category <n|name|all> switch category
  sort title|nominations
  hide | show           pause or resume live updates
  refresh               reload from the server
  help | quit
";

/// Split a line into its verb and the (trimmed) rest.
fn split(line: &str) -> (String, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb.to_lowercase(), rest.trim()),
        None => (line.to_lowercase(), ""),
    }
}

fn one_arg<'a>(rest: &'a str, usage: &'static str) -> Result<&'a str, CommandError> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return Err(CommandError::Usage(usage));
    }
    Ok(rest)
}

fn parse_year(rest: &str) -> Result<u32, CommandError> {
    one_arg(rest, "year <year>")?
        .parse()
        .map_err(|_| CommandError::Usage("year <year>"))
}

fn parse_sort(rest: &str) -> Result<SortOrder, CommandError> {
    SortOrder::parse(&rest.to_lowercase()).ok_or(CommandError::Usage("sort title|nominations"))
}

fn parse_category(rest: &str, ctx: &ViewContext) -> Result<String, CommandError> {
    if rest.is_empty() {
        return Err(CommandError::Usage("category <n|name|all>"));
    }
    ctx.resolve_category(rest)
        .ok_or_else(|| CommandError::UnknownCategory(rest.to_string()))
}

/// Parse a viewer console line. Blank lines yield `Ok(None)`.
pub fn parse_user_line(
    line: &str,
    ctx: &ViewContext,
) -> Result<Option<Input<UserCommand>>, CommandError> {
    let (verb, rest) = split(line);
    let cmd = match verb.as_str() {
        "" => return Ok(None),
        "help" | "?" => return Ok(Some(Input::Help)),
        "seen" => UserCommand::ToggleSeen {
            film_id: one_arg(rest, "seen <film>")?.to_string(),
        },
        "pick" => {
            let film_id = one_arg(rest, "pick <film>")?.to_string();
            if ctx.category == ALL_CATEGORIES {
                return Err(CommandError::NoCategory);
            }
            UserCommand::TogglePick {
                category: ctx.category.clone(),
                film_id,
            }
        }
        "year" => UserCommand::SelectYear(parse_year(rest)?),
        "category" | "cat" => UserCommand::SelectCategory(parse_category(rest, ctx)?),
        "sort" => UserCommand::SelectSort(parse_sort(rest)?),
        "hide" => UserCommand::SetVisible(false),
        "show" => UserCommand::SetVisible(true),
        "refresh" | "r" => UserCommand::Refresh,
        "quit" | "q" | "exit" => UserCommand::Quit,
        _ => return Err(CommandError::Unknown(verb)),
    };
    Ok(Some(Input::Command(cmd)))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Refresh,
    SelectYear(u32),
    SelectCategory(String),
    SelectSort(SortOrder),
    ToggleEventMode,
    ToggleVotingLock,
    ToggleWinner {
        category: String,
        film_id: String,
    },
    SaveBanner {
        enabled: bool,
        text: String,
    },
    SaveWatch {
        film_id: String,
        url: String,
        free_to_watch: bool,
    },
    SavePoster {
        film_id: String,
        url: String,
    },
    ClearWatch(String),
    ClearPoster(String),
    AuditLogs(AuditFilter),
    Logout,
    Quit,
}

pub const ADMIN_HELP: &str = "\
Admin commands:
  event                      toggle event mode (live updates for viewers)
  lock                       toggle the voting lock
  winner <film>              toggle the winner of the current category
  banner on|off [text]       save the announcement banner
  watch <film> <url> [free]  set a where-to-watch override
  poster <film> <url>        set a poster override
  clear-watch <film>         clear the watch override
  clear-poster <film>        clear the poster override
  logs [ok|failed|all] [limit] [action]
                             show recent admin actions
  year <year> | category <n|name|all> | sort title|nominations
  refresh | logout | help | quit
";

const LOGS_USAGE: &str = "logs [ok|failed|all] [limit] [action]";

/// Filter words may come in any order; a bare number is the limit and any
/// other word the action.
fn parse_audit_filter(args: &[&str]) -> Result<AuditFilter, CommandError> {
    let mut filter = AuditFilter::default();
    let mut action = None;
    for arg in args {
        match arg.to_lowercase().as_str() {
            "ok" | "success" => filter.outcome = AuditOutcome::Success,
            "failed" | "failure" => filter.outcome = AuditOutcome::Failure,
            "all" => filter.outcome = AuditOutcome::All,
            digits if digits.chars().all(|c| c.is_ascii_digit()) => {
                filter.limit = match digits.parse() {
                    Ok(limit) if limit > 0 => limit,
                    _ => return Err(CommandError::Usage(LOGS_USAGE)),
                };
            }
            _ if action.is_none() => action = Some(arg.to_string()),
            _ => return Err(CommandError::Usage(LOGS_USAGE)),
        }
    }
    filter.action = action;
    Ok(filter)
}

/// Parse an admin console line. Blank lines yield `Ok(None)`.
pub fn parse_admin_line(
    line: &str,
    ctx: &ViewContext,
) -> Result<Option<Input<AdminCommand>>, CommandError> {
    let (verb, rest) = split(line);
    let args: Vec<&str> = rest.split_whitespace().collect();
    let cmd = match verb.as_str() {
        "" => return Ok(None),
        "help" | "?" => return Ok(Some(Input::Help)),
        "refresh" | "r" => AdminCommand::Refresh,
        "year" => AdminCommand::SelectYear(parse_year(rest)?),
        "category" | "cat" => AdminCommand::SelectCategory(parse_category(rest, ctx)?),
        "sort" => AdminCommand::SelectSort(parse_sort(rest)?),
        "event" => AdminCommand::ToggleEventMode,
        "lock" => AdminCommand::ToggleVotingLock,
        "winner" => {
            let film_id = one_arg(rest, "winner <film>")?.to_string();
            if ctx.category == ALL_CATEGORIES {
                return Err(CommandError::NoCategory);
            }
            AdminCommand::ToggleWinner {
                category: ctx.category.clone(),
                film_id,
            }
        }
        "banner" => {
            let (state, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let enabled = match state.to_lowercase().as_str() {
                "on" => true,
                "off" => false,
                _ => return Err(CommandError::Usage("banner on|off [text]")),
            };
            AdminCommand::SaveBanner {
                enabled,
                text: text.trim().to_string(),
            }
        }
        "watch" => match args.as_slice() {
            [film, url] => AdminCommand::SaveWatch {
                film_id: film.to_string(),
                url: url.to_string(),
                free_to_watch: false,
            },
            [film, url, free] if free.eq_ignore_ascii_case("free") => AdminCommand::SaveWatch {
                film_id: film.to_string(),
                url: url.to_string(),
                free_to_watch: true,
            },
            _ => return Err(CommandError::Usage("watch <film> <url> [free]")),
        },
        "poster" => match args.as_slice() {
            [film, url] => AdminCommand::SavePoster {
                film_id: film.to_string(),
                url: url.to_string(),
            },
            _ => return Err(CommandError::Usage("poster <film> <url>")),
        },
        "clear-watch" => AdminCommand::ClearWatch(one_arg(rest, "clear-watch <film>")?.to_string()),
        "clear-poster" => {
            AdminCommand::ClearPoster(one_arg(rest, "clear-poster <film>")?.to_string())
        }
        "logs" | "audit" => AdminCommand::AuditLogs(parse_audit_filter(&args)?),
        "logout" => AdminCommand::Logout,
        "quit" | "q" | "exit" => AdminCommand::Quit,
        _ => return Err(CommandError::Unknown(verb)),
    };
    Ok(Some(Input::Command(cmd)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(category: &str) -> ViewContext {
        ViewContext {
            category: category.to_string(),
            categories: vec!["Actor in a Leading Role".into(), "Sound".into()],
        }
    }

    fn user(line: &str) -> Result<Option<Input<UserCommand>>, CommandError> {
        parse_user_line(line, &ctx("Sound"))
    }

    #[test]
    fn pick_applies_to_current_category() {
        assert_eq!(
            user("pick f2"),
            Ok(Some(Input::Command(UserCommand::TogglePick {
                category: "Sound".into(),
                film_id: "f2".into(),
            })))
        );
    }

    #[test]
    fn pick_in_all_films_is_refused() {
        assert_eq!(
            parse_user_line("pick f2", &ctx(ALL_CATEGORIES)),
            Err(CommandError::NoCategory)
        );
    }

    #[test]
    fn verbs_are_case_insensitive_and_trimmed() {
        assert_eq!(
            user("  SEEN f1 "),
            Ok(Some(Input::Command(UserCommand::ToggleSeen {
                film_id: "f1".into()
            })))
        );
        assert_eq!(user("Q"), Ok(Some(Input::Command(UserCommand::Quit))));
    }

    #[test]
    fn blank_and_help_lines() {
        assert_eq!(user("   "), Ok(None));
        assert_eq!(user("help"), Ok(Some(Input::Help)));
    }

    #[test]
    fn category_by_number_name_or_all() {
        assert_eq!(
            user("category 1"),
            Ok(Some(Input::Command(UserCommand::SelectCategory(
                "Actor in a Leading Role".into()
            ))))
        );
        assert_eq!(
            user("cat actor in a leading role"),
            Ok(Some(Input::Command(UserCommand::SelectCategory(
                "Actor in a Leading Role".into()
            ))))
        );
        assert_eq!(
            user("category all"),
            Ok(Some(Input::Command(UserCommand::SelectCategory(
                ALL_CATEGORIES.into()
            ))))
        );
        assert_eq!(
            user("category Editing"),
            Err(CommandError::UnknownCategory("Editing".into()))
        );
    }

    #[test]
    fn bad_arguments_report_usage() {
        assert_eq!(user("year next"), Err(CommandError::Usage("year <year>")));
        assert_eq!(user("seen"), Err(CommandError::Usage("seen <film>")));
        assert_eq!(
            user("sort rating"),
            Err(CommandError::Usage("sort title|nominations"))
        );
        assert_eq!(user("dance"), Err(CommandError::Unknown("dance".into())));
    }

    #[test]
    fn visibility_and_sort() {
        assert_eq!(
            user("hide"),
            Ok(Some(Input::Command(UserCommand::SetVisible(false))))
        );
        assert_eq!(
            user("sort Nominations"),
            Ok(Some(Input::Command(UserCommand::SelectSort(
                SortOrder::Nominations
            ))))
        );
    }

    #[test]
    fn admin_banner_keeps_text_spacing_inside() {
        assert_eq!(
            parse_admin_line("banner on  Live from   the Dolby ", &ctx("Sound")),
            Ok(Some(Input::Command(AdminCommand::SaveBanner {
                enabled: true,
                text: "Live from   the Dolby".into(),
            })))
        );
        assert_eq!(
            parse_admin_line("banner off", &ctx("Sound")),
            Ok(Some(Input::Command(AdminCommand::SaveBanner {
                enabled: false,
                text: String::new(),
            })))
        );
    }

    #[test]
    fn admin_winner_and_overrides() {
        assert_eq!(
            parse_admin_line("winner f3", &ctx("Sound")),
            Ok(Some(Input::Command(AdminCommand::ToggleWinner {
                category: "Sound".into(),
                film_id: "f3".into(),
            })))
        );
        assert_eq!(
            parse_admin_line("watch f1 https://w.example free", &ctx("Sound")),
            Ok(Some(Input::Command(AdminCommand::SaveWatch {
                film_id: "f1".into(),
                url: "https://w.example".into(),
                free_to_watch: true,
            })))
        );
        assert_eq!(
            parse_admin_line("poster f1", &ctx("Sound")),
            Err(CommandError::Usage("poster <film> <url>"))
        );
        assert_eq!(
            parse_admin_line("winner f3", &ctx(ALL_CATEGORIES)),
            Err(CommandError::NoCategory)
        );
    }

    #[test]
    fn admin_logs_filter_words_in_any_order() {
        assert_eq!(
            parse_admin_line("logs", &ctx("Sound")),
            Ok(Some(Input::Command(AdminCommand::AuditLogs(
                AuditFilter::default()
            ))))
        );
        assert_eq!(
            parse_admin_line("logs 20 admin_login FAILED", &ctx("Sound")),
            Ok(Some(Input::Command(AdminCommand::AuditLogs(AuditFilter {
                action: Some("admin_login".into()),
                outcome: AuditOutcome::Failure,
                limit: 20,
            }))))
        );
        assert_eq!(
            parse_admin_line("logs 0", &ctx("Sound")),
            Err(CommandError::Usage(LOGS_USAGE))
        );
        assert_eq!(
            parse_admin_line("logs winner_update banner_update", &ctx("Sound")),
            Err(CommandError::Usage(LOGS_USAGE))
        );
    }
}
