//! Chat command parsing and handling.
//!
//! Commands are recognized only when the message starts with the configured prefix, so normal
//! conversation never triggers anything. [`parse_command`] is pure; [`CommandHandler::handle`]
//! runs the parsed command against a [`Game`] and returns the reply lines. Admin commands are
//! limited to the configured owner ids.

use chrono::{DateTime, Duration, Utc};
use log::{info, trace};

use super::errors::GameError;
use super::events::{BuyOutcome, OpenOutcome, ResetOutcome};
use super::storage::{MemberUpdate, SetField, UnsetField};
use super::types::{
    group_thousands, BoxKind, Cadence, Currency, Field, PlayerId, QuestRecord,
};
use super::Game;
use crate::logutil::escape_log;

/// How the player wants the shiny hunt changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuntArg {
    Show,
    Clear,
    Set(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Help,
    Start,
    Event,
    Quests,
    Level,
    Balance,
    Bingo,
    ResetCard,
    Open { kind: Option<BoxKind>, qty: i64 },
    Buy { kind: Option<BoxKind>, qty: i64 },
    /// `None` toggles.
    Notify(Option<bool>),
    Hunt(HuntArg),
    AddBox { target: PlayerId, kind: BoxKind, qty: i64 },
    AddCoins { target: PlayerId, amount: i64 },
    AddXp { target: PlayerId, amount: i64 },
    ResetQuests { target: PlayerId },
    CompleteQuests { target: PlayerId, n: usize },
    /// Timed shiny charm; zero hours removes it.
    Charm { target: PlayerId, hours: i64 },
    Unknown(String),
    Invalid(String),
}

impl BotCommand {
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            BotCommand::AddBox { .. }
                | BotCommand::AddCoins { .. }
                | BotCommand::AddXp { .. }
                | BotCommand::ResetQuests { .. }
                | BotCommand::CompleteQuests { .. }
                | BotCommand::Charm { .. }
        )
    }
}

/// Parse one chat message. `None` when it is not addressed to the bot.
pub fn parse_command(prefix: &str, raw: &str) -> Option<BotCommand> {
    let body = raw.trim().strip_prefix(prefix)?;
    let mut words = body.split_whitespace();
    let name = words.next()?.to_lowercase();
    let args: Vec<&str> = words.collect();
    trace!("parsed '{}' with {} arg(s) from '{}'", name, args.len(), escape_log(raw));

    let cmd = match name.as_str() {
        "help" | "?" => BotCommand::Help,
        "start" | "register" => BotCommand::Start,
        "event" => BotCommand::Event,
        "quests" | "q" => BotCommand::Quests,
        "level" | "lvl" => BotCommand::Level,
        "balance" | "bal" => BotCommand::Balance,
        "bingo" | "card" | "board" => BotCommand::Bingo,
        "reset" => BotCommand::ResetCard,
        "open" => match parse_box_args(&args) {
            Ok((kind, qty)) => BotCommand::Open { kind, qty },
            Err(msg) => BotCommand::Invalid(msg),
        },
        "buy" => match parse_box_args(&args) {
            Ok((kind, qty)) => BotCommand::Buy { kind, qty },
            Err(msg) => BotCommand::Invalid(msg),
        },
        "notify" => match args.first().map(|a| a.to_lowercase()) {
            None => BotCommand::Notify(None),
            Some(a) if a == "on" => BotCommand::Notify(Some(true)),
            Some(a) if a == "off" => BotCommand::Notify(Some(false)),
            Some(_) => BotCommand::Invalid("Usage: notify [on|off]".into()),
        },
        "hunt" => match args.first() {
            None => BotCommand::Hunt(HuntArg::Show),
            Some(a) if a.eq_ignore_ascii_case("off") => BotCommand::Hunt(HuntArg::Clear),
            Some(a) => match a.parse::<u32>() {
                Ok(dex) => BotCommand::Hunt(HuntArg::Set(dex)),
                Err(_) => BotCommand::Invalid("Usage: hunt <dex number>|off".into()),
            },
        },
        "addbox" => match (target_arg(&args, 0), args.get(1).and_then(|k| BoxKind::parse(k))) {
            (Some(target), Some(kind)) => match amount_arg(&args, 2, 1) {
                Some(qty) => BotCommand::AddBox { target, kind, qty },
                None => BotCommand::Invalid("Quantity must be a whole number.".into()),
            },
            _ => BotCommand::Invalid("Usage: addbox <player> <kind> [qty]".into()),
        },
        "addcoins" => match (target_arg(&args, 0), amount_arg(&args, 1, 0)) {
            (Some(target), Some(amount)) if args.len() >= 2 => {
                BotCommand::AddCoins { target, amount }
            }
            _ => BotCommand::Invalid("Usage: addcoins <player> <amount>".into()),
        },
        "addxp" => match (target_arg(&args, 0), amount_arg(&args, 1, 0)) {
            (Some(target), Some(amount)) if args.len() >= 2 => BotCommand::AddXp { target, amount },
            _ => BotCommand::Invalid("Usage: addxp <player> <amount>".into()),
        },
        "resetquests" => match target_arg(&args, 0) {
            Some(target) => BotCommand::ResetQuests { target },
            None => BotCommand::Invalid("Usage: resetquests <player>".into()),
        },
        "completequests" => match (target_arg(&args, 0), amount_arg(&args, 1, 1)) {
            (Some(target), Some(n)) if n > 0 => BotCommand::CompleteQuests {
                target,
                n: n as usize,
            },
            _ => BotCommand::Invalid("Usage: completequests <player> [n]".into()),
        },
        "charm" => match (target_arg(&args, 0), args.get(1)) {
            (Some(target), Some(a)) if a.eq_ignore_ascii_case("off") => {
                BotCommand::Charm { target, hours: 0 }
            }
            (Some(target), Some(_)) => match amount_arg(&args, 1, 0) {
                Some(hours) if hours >= 0 => BotCommand::Charm { target, hours },
                _ => BotCommand::Invalid("Hours must be a whole number of at least 0.".into()),
            },
            _ => BotCommand::Invalid("Usage: charm <player> <hours>|off".into()),
        },
        other => BotCommand::Unknown(other.to_string()),
    };
    Some(cmd)
}

/// `[kind] [qty]`, `[qty]`, or nothing. Quantities may be zero or negative; bounds are the
/// handler's call.
fn parse_box_args(args: &[&str]) -> Result<(Option<BoxKind>, i64), String> {
    match args {
        [] => Ok((None, 1)),
        [single] => match single.parse::<i64>() {
            Ok(qty) => Ok((None, qty)),
            Err(_) => BoxKind::parse(single)
                .map(|kind| (Some(kind), 1))
                .ok_or_else(|| format!("Unknown box type '{}'.", single)),
        },
        [kind, qty, ..] => {
            let kind = BoxKind::parse(kind).ok_or_else(|| format!("Unknown box type '{}'.", kind))?;
            let qty = qty
                .parse::<i64>()
                .map_err(|_| "Quantity must be a whole number.".to_string())?;
            Ok((Some(kind), qty))
        }
    }
}

/// Player ids may be typed raw or as a `<@123>` / `<@!123>` mention.
fn target_arg(args: &[&str], at: usize) -> Option<PlayerId> {
    let raw = args.get(at)?;
    let trimmed = raw
        .trim_start_matches("<@")
        .trim_start_matches('!')
        .trim_end_matches('>');
    trimmed.parse().ok()
}

fn amount_arg(args: &[&str], at: usize, default: i64) -> Option<i64> {
    match args.get(at) {
        None => Some(default),
        Some(raw) => raw.replace(',', "").parse().ok(),
    }
}

pub struct CommandHandler {
    game: Game,
    prefix: String,
    owners: Vec<PlayerId>,
}

impl CommandHandler {
    pub fn new(game: Game, prefix: impl Into<String>, owners: Vec<PlayerId>) -> Self {
        Self {
            game,
            prefix: prefix.into(),
            owners,
        }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Handle one message. `None` when it was not a command.
    pub async fn handle(
        &self,
        player: PlayerId,
        username: &str,
        raw: &str,
    ) -> Result<Option<Vec<String>>, GameError> {
        let Some(cmd) = parse_command(&self.prefix, raw) else {
            return Ok(None);
        };
        self.run(player, username, cmd).await.map(Some)
    }

    pub async fn run(
        &self,
        player: PlayerId,
        username: &str,
        cmd: BotCommand,
    ) -> Result<Vec<String>, GameError> {
        if cmd.is_admin() && !self.owners.contains(&player) {
            info!(
                "denied admin command from {}",
                crate::logutil::player_label(player, username)
            );
            return Ok(vec!["You don't have permission to do that.".into()]);
        }
        match cmd {
            BotCommand::Help => Ok(self.help_lines()),
            BotCommand::Start => self.start(player, username).await,
            BotCommand::Unknown(name) => Ok(vec![format!(
                "Unknown command '{}'. Try `{}help`.",
                escape_log(&name),
                self.prefix
            )]),
            BotCommand::Invalid(msg) => Ok(vec![msg]),
            cmd if cmd.is_admin() => self.admin(cmd).await,
            cmd => {
                if self.game.store.get(player).await?.is_none() {
                    return Ok(vec![format!(
                        "Please pick a starter first with `{}start`.",
                        self.prefix
                    )]);
                }
                self.player_command(player, cmd).await
            }
        }
    }

    fn help_lines(&self) -> Vec<String> {
        let p = &self.prefix;
        vec![
            format!("{p}start - create your account"),
            format!("{p}event - current event and your boxes"),
            format!("{p}open [kind] [qty] - open event boxes"),
            format!("{p}buy <kind> [qty] - buy boxes with event coins"),
            format!("{p}quests - daily and weekly quests"),
            format!("{p}bingo - your event bingo card"),
            format!("{p}reset - start a new bingo card once yours is full"),
            format!("{p}level - event level and XP"),
            format!("{p}balance - your currencies"),
            format!("{p}notify [on|off] - quest refresh messages"),
            format!("{p}hunt <dex>|off - choose a shiny hunt"),
        ]
    }

    async fn start(&self, player: PlayerId, username: &str) -> Result<Vec<String>, GameError> {
        if self.game.store.get(player).await?.is_some() {
            return Ok(vec!["You already have an account!".into()]);
        }
        self.game.store.create(player, username).await?;
        self.game.quests.refresh_expired(player).await?;
        if let Some(ref cog) = self.game.event {
            cog.ensure_card(player).await?;
        }
        info!("registered {}", crate::logutil::player_label(player, username));
        Ok(vec![
            format!("Welcome, {}!", username),
            format!("Check your quests with `{}quests`.", self.prefix),
        ])
    }

    async fn player_command(
        &self,
        player: PlayerId,
        cmd: BotCommand,
    ) -> Result<Vec<String>, GameError> {
        match cmd {
            BotCommand::Event => match self.game.event {
                Some(ref cog) => cog.overview(player).await,
                None => Ok(vec![no_event()]),
            },
            BotCommand::Open { kind, qty } => {
                let Some(ref cog) = self.game.event else {
                    return Ok(vec![no_event()]);
                };
                let Some(kind) = kind.or_else(|| cog.default_box()) else {
                    return Ok(vec![self.which_box(cog)]);
                };
                Ok(match cog.open_boxes(player, kind, qty).await? {
                    OpenOutcome::Rejected(msg) => vec![msg],
                    OpenOutcome::Opened {
                        title,
                        rewards,
                        completions,
                        bingo,
                    } => {
                        let mut lines = vec![title];
                        lines.extend(rewards.iter().map(|r| format!("- {}", r.describe())));
                        for completion in &completions {
                            lines.extend(completion.message_lines());
                        }
                        lines.extend(bingo);
                        lines
                    }
                })
            }
            BotCommand::Bingo => match self.game.event {
                Some(ref cog) => cog.card_lines(player).await,
                None => Ok(vec![no_event()]),
            },
            BotCommand::ResetCard => {
                let Some(ref cog) = self.game.event else {
                    return Ok(vec![no_event()]);
                };
                Ok(match cog.reset_card(player).await? {
                    ResetOutcome::Rejected(msg) => vec![msg],
                    ResetOutcome::Reset { boards_completed } => vec![
                        "Your card has been reset.".into(),
                        format!("Cards completed: {}", boards_completed),
                    ],
                })
            }
            BotCommand::Buy { kind, qty } => {
                let Some(ref cog) = self.game.event else {
                    return Ok(vec![no_event()]);
                };
                let Some(kind) = kind.or_else(|| cog.default_box()) else {
                    return Ok(vec![self.which_box(cog)]);
                };
                Ok(match cog.buy_boxes(player, kind, qty).await? {
                    BuyOutcome::Rejected(msg) => vec![msg],
                    BuyOutcome::Bought {
                        message,
                        community_total,
                        ..
                    } => vec![
                        message,
                        format!(
                            "The community has spent 🪙 {} so far.",
                            group_thousands(community_total)
                        ),
                    ],
                })
            }
            BotCommand::Quests => {
                let quests = self.game.quests.active_quests(player).await?;
                let now = self.game.clock.now();
                let mut lines = Vec::new();
                for cadence in Cadence::ALL {
                    let set: Vec<&QuestRecord> =
                        quests.iter().filter(|q| q.cadence == cadence).collect();
                    let header = match set.first() {
                        Some(q) => format!(
                            "**{} quests** (reset in {})",
                            cadence.name(),
                            format_remaining(q.expires, now)
                        ),
                        None => format!("**{} quests**", cadence.name()),
                    };
                    lines.push(header);
                    lines.extend(set.iter().map(|q| quest_line(q)));
                }
                Ok(lines)
            }
            BotCommand::Level => {
                let progress = self.game.progression.progress_of(player).await?;
                Ok(vec![format!(
                    "You are level {} with {}/{} XP toward the next level.",
                    progress.level,
                    progress.xp_into_level,
                    progress.xp_into_level + progress.xp_to_next
                )])
            }
            BotCommand::Balance => {
                let record = self.game.store.require(player).await?;
                let mut lines = vec![
                    Currency::Pokecoins.format_amount(record.balance),
                    Currency::Shards.format_amount(record.premium_balance),
                    Currency::Redeems.format_amount(record.redeems),
                ];
                if self.game.event.is_some() {
                    lines.push(format!("🪙 {} event coins", group_thousands(record.event_coins)));
                }
                Ok(lines)
            }
            BotCommand::Notify(choice) => {
                let record = self.game.store.require(player).await?;
                let enabled = choice.unwrap_or(!record.quests_notify);
                self.game
                    .store
                    .update(player, &MemberUpdate::new().set(SetField::QuestsNotify(enabled)))
                    .await?;
                Ok(vec![if enabled {
                    "Quest refresh notifications are on.".into()
                } else {
                    "Quest refresh notifications are off.".into()
                }])
            }
            BotCommand::Hunt(arg) => self.hunt(player, arg).await,
            _ => Ok(Vec::new()),
        }
    }

    async fn hunt(&self, player: PlayerId, arg: HuntArg) -> Result<Vec<String>, GameError> {
        match arg {
            HuntArg::Show => {
                let record = self.game.store.require(player).await?;
                Ok(vec![match record.shiny_hunt {
                    Some(dex) => format!(
                        "You are hunting #{} with a streak of {}.",
                        dex, record.shiny_streak
                    ),
                    None => "You are not hunting anything.".into(),
                }])
            }
            HuntArg::Clear => {
                let update = MemberUpdate::new()
                    .unset(UnsetField::ShinyHunt)
                    .set(SetField::Counter(Field::ShinyStreak, 0));
                self.game.store.update(player, &update).await?;
                Ok(vec!["Shiny hunt cleared.".into()])
            }
            HuntArg::Set(dex) => {
                let Some(species) = self
                    .game
                    .catalog
                    .all()
                    .into_iter()
                    .find(|s| s.dex_number == dex)
                else {
                    return Ok(vec![format!("No species with dex number {}.", dex)]);
                };
                let update = MemberUpdate::new()
                    .set(SetField::ShinyHunt(dex))
                    .set(SetField::Counter(Field::ShinyStreak, 0));
                self.game.store.update(player, &update).await?;
                Ok(vec![format!("You are now hunting {}.", species.name)])
            }
        }
    }

    async fn admin(&self, cmd: BotCommand) -> Result<Vec<String>, GameError> {
        let missing = |target: PlayerId| vec![format!("Player {} has no account.", target)];
        match cmd {
            BotCommand::AddBox { target, kind, qty } => {
                let added = match self.game.event {
                    Some(ref cog) => cog.add_boxes(target, kind, qty).await?,
                    None => return Ok(vec![no_event()]),
                };
                if !added {
                    return Ok(missing(target));
                }
                info!("admin added {} {} box(es) to {}", qty, kind.slug(), target);
                Ok(vec![format!("Gave {} {} box(es) to {}.", qty, kind.slug(), target)])
            }
            BotCommand::AddCoins { target, amount } => {
                let added = match self.game.event {
                    Some(ref cog) => cog.add_coins(target, amount).await?,
                    None => return Ok(vec![no_event()]),
                };
                if !added {
                    return Ok(missing(target));
                }
                info!("admin added {} event coins to {}", amount, target);
                Ok(vec![format!(
                    "Gave 🪙 {} to {}.",
                    group_thousands(amount),
                    target
                )])
            }
            BotCommand::AddXp { target, amount } => {
                if amount < 0 {
                    return Ok(vec!["XP can only be added, not removed.".into()]);
                }
                if self.game.store.get(target).await?.is_none() {
                    return Ok(missing(target));
                }
                let report = self.game.progression.grant_xp(target, amount).await?;
                let mut lines = vec![format!(
                    "Gave {} XP to {} (level {} -> {}).",
                    amount, target, report.before.level, report.after.level
                )];
                lines.extend(report.summary_lines());
                Ok(lines)
            }
            BotCommand::ResetQuests { target } => match self.game.quests.reset_quests(target).await
            {
                Ok(()) => Ok(vec![format!("Quests reset for {}.", target)]),
                Err(GameError::NotFound(_)) => Ok(missing(target)),
                Err(e) => Err(e),
            },
            BotCommand::CompleteQuests { target, n } => {
                if self.game.store.get(target).await?.is_none() {
                    return Ok(missing(target));
                }
                let done = self.game.quests.force_complete(target, n).await?;
                let mut lines = vec![format!("Completed {} quest(s) for {}.", done.len(), target)];
                for completion in &done {
                    lines.extend(completion.message_lines());
                }
                if let Some(ref cog) = self.game.event {
                    lines.extend(cog.settle_bingos(target).await?);
                }
                Ok(lines)
            }
            BotCommand::Charm { target, hours } => {
                let Some(record) = self.game.store.get(target).await? else {
                    return Ok(missing(target));
                };
                if hours == 0 {
                    self.game
                        .store
                        .update(target, &MemberUpdate::new().unset(UnsetField::ShinyCharm))
                        .await?;
                    info!("admin removed the shiny charm of {}", target);
                    return Ok(vec![format!("Removed {}'s shiny charm.", target)]);
                }
                let Some(span) = Duration::try_hours(hours) else {
                    return Ok(vec!["That's far too long.".into()]);
                };
                // A charm still running is extended rather than cut short.
                let now = self.game.clock.now();
                let from = record.shiny_charm_expires.filter(|at| *at > now).unwrap_or(now);
                let Some(expires) = from.checked_add_signed(span) else {
                    return Ok(vec!["That's far too long.".into()]);
                };
                self.game
                    .store
                    .update(
                        target,
                        &MemberUpdate::new().set(SetField::ShinyCharmExpires(expires)),
                    )
                    .await?;
                info!("admin gave {} a shiny charm until {}", target, expires);
                Ok(vec![format!(
                    "Gave {} a shiny charm for {}h (until {}).",
                    target,
                    hours,
                    expires.format("%Y-%m-%d %H:%M UTC")
                )])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn which_box(&self, cog: &super::events::EventCog) -> String {
        let kinds: Vec<&str> = cog.spec().boxes.iter().map(|b| b.kind.slug()).collect();
        format!(
            "Which box? Use `{}open <kind> [qty]` with one of: {}",
            self.prefix,
            kinds.join(", ")
        )
    }
}

fn no_event() -> String {
    "There is no event running right now.".into()
}

fn quest_line(quest: &QuestRecord) -> String {
    let mark = if quest.completed { "✅" } else { "▫️" };
    format!(
        "{} {} ({}/{})",
        mark, quest.description, quest.progress, quest.count
    )
}

/// "3h 12m" / "2d 4h"
pub fn format_remaining(until: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (until - now).num_seconds().max(0);
    let (days, hours, minutes) = (secs / 86_400, secs % 86_400 / 3600, secs % 3600 / 60);
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else {
        format!("{}h {}m", hours, minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ignores_unprefixed_chatter() {
        assert_eq!(parse_command("!", "open event 3"), None);
        assert_eq!(parse_command("!", "!"), None);
    }

    #[test]
    fn parses_box_arguments() {
        assert_eq!(
            parse_command("!", "!open"),
            Some(BotCommand::Open { kind: None, qty: 1 })
        );
        assert_eq!(
            parse_command("!", "!open 5"),
            Some(BotCommand::Open { kind: None, qty: 5 })
        );
        assert_eq!(
            parse_command("!", "!OPEN e -2"),
            Some(BotCommand::Open {
                kind: Some(BoxKind::Event),
                qty: -2
            })
        );
        assert_eq!(
            parse_command("!", "!buy santa"),
            Some(BotCommand::Buy {
                kind: Some(BoxKind::Special),
                qty: 1
            })
        );
        assert!(matches!(
            parse_command("!", "!open bogus"),
            Some(BotCommand::Invalid(_))
        ));
        assert!(matches!(
            parse_command("!", "!open event lots"),
            Some(BotCommand::Invalid(_))
        ));
    }

    #[test]
    fn parses_admin_targets_and_mentions() {
        assert_eq!(
            parse_command("!", "!addbox <@!42> pokemon 3"),
            Some(BotCommand::AddBox {
                target: 42,
                kind: BoxKind::Creature,
                qty: 3
            })
        );
        assert_eq!(
            parse_command("!", "!addcoins 7 1,000"),
            Some(BotCommand::AddCoins {
                target: 7,
                amount: 1000
            })
        );
        assert!(matches!(
            parse_command("!", "!addxp 7"),
            Some(BotCommand::Invalid(_))
        ));
        assert_eq!(
            parse_command("!", "!completequests 9"),
            Some(BotCommand::CompleteQuests { target: 9, n: 1 })
        );
        assert!(parse_command("!", "!resetquests 9").is_some_and(|c| c.is_admin()));
        assert_eq!(
            parse_command("!", "!charm 9 48"),
            Some(BotCommand::Charm {
                target: 9,
                hours: 48
            })
        );
        assert_eq!(
            parse_command("!", "!charm 9 off"),
            Some(BotCommand::Charm { target: 9, hours: 0 })
        );
        assert!(matches!(
            parse_command("!", "!charm 9 -3"),
            Some(BotCommand::Invalid(_))
        ));
        assert!(parse_command("!", "!charm 9 1").is_some_and(|c| c.is_admin()));
    }

    #[test]
    fn notify_and_hunt_forms() {
        assert_eq!(parse_command("!", "!notify"), Some(BotCommand::Notify(None)));
        assert_eq!(
            parse_command("!", "!notify OFF"),
            Some(BotCommand::Notify(Some(false)))
        );
        assert_eq!(
            parse_command("!", "!hunt 25"),
            Some(BotCommand::Hunt(HuntArg::Set(25)))
        );
        assert_eq!(
            parse_command("!", "!hunt off"),
            Some(BotCommand::Hunt(HuntArg::Clear))
        );
        assert_eq!(parse_command("!", "!card"), Some(BotCommand::Bingo));
        assert_eq!(parse_command("!", "!reset"), Some(BotCommand::ResetCard));
        assert_eq!(
            parse_command("!", "!dance"),
            Some(BotCommand::Unknown("dance".into()))
        );
    }

    #[test]
    fn remaining_time_formats() {
        let now = Utc.with_ymd_and_hms(2024, 3, 30, 10, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();
        assert_eq!(format_remaining(later, now), "14h 0m");
        let monday = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        assert_eq!(format_remaining(monday, now), "1d 14h");
        assert_eq!(format_remaining(now, later), "0h 0m");
    }
}
