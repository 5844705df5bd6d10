use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Alert,
    Info,
    Success,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// `None` for "all" and anything unrecognised.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::High => "Alta",
            Self::Medium => "Média",
            Self::Low => "Baixa",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadFilter {
    #[default]
    All,
    Unread,
    Read,
}

impl ReadFilter {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "unread" => Self::Unread,
            "read" => Self::Read,
            _ => Self::All,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: NoticeKind,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub date: NaiveDateTime,
    pub read: bool,
    /// Page the notification links to.
    pub action: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCounts {
    pub total: usize,
    pub unread: usize,
    pub high_priority_unread: usize,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationCenter {
    items: Vec<Notification>,
    next_id: u64,
}

impl NotificationCenter {
    pub fn new(items: Vec<Notification>) -> Self {
        let next_id = items.iter().map(|item| item.id).max().unwrap_or(0) + 1;
        Self { items, next_id }
    }

    pub fn with_fixtures() -> Self {
        Self::new(fixtures())
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn counts(&self) -> NotificationCounts {
        NotificationCounts {
            total: self.items.len(),
            unread: self.items.iter().filter(|item| !item.read).count(),
            high_priority_unread: self
                .items
                .iter()
                .filter(|item| item.priority == Priority::High && !item.read)
                .count(),
        }
    }

    pub fn filtered(&self, priority: Option<Priority>, status: ReadFilter) -> Vec<&Notification> {
        self.items
            .iter()
            .filter(|item| priority.is_none_or(|priority| item.priority == priority))
            .filter(|item| match status {
                ReadFilter::All => true,
                ReadFilter::Unread => !item.read,
                ReadFilter::Read => item.read,
            })
            .collect()
    }

    /// Returns false when no notification has that id.
    pub fn set_read(&mut self, id: u64, read: bool) -> bool {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.read = read;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_read(&mut self) {
        for item in &mut self.items {
            item.read = true;
        }
    }

    pub fn delete(&mut self, id: u64) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Newest first.
    pub fn push(&mut self, kind: NoticeKind, priority: Priority, title: &str, message: &str, action: Option<&'static str>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.items.insert(
            0,
            Notification {
                id,
                kind,
                priority,
                title: title.to_string(),
                message: message.to_string(),
                date: Local::now().naive_local(),
                read: false,
                action,
            },
        );
        id
    }
}

pub fn relative_label(date: NaiveDateTime, now: NaiveDateTime) -> String {
    let elapsed = now - date;
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();
    let plural = |n: i64| if n > 1 { "s" } else { "" };

    if minutes < 1 {
        "Agora mesmo".to_string()
    } else if minutes < 60 {
        format!("Há {minutes} minuto{}", plural(minutes))
    } else if hours < 24 {
        format!("Há {hours} hora{}", plural(hours))
    } else if days < 7 {
        format!("Há {days} dia{}", plural(days))
    } else {
        date.format("%d/%m/%Y às %H:%M").to_string()
    }
}

pub fn fixtures() -> Vec<Notification> {
    let at = |y, m, d, hh, mm| {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(hh, mm, 0))
            .unwrap_or_default()
    };
    let notice = |id, kind, priority, title: &str, message: &str, date, read, action| Notification {
        id,
        kind,
        priority,
        title: title.to_string(),
        message: message.to_string(),
        date,
        read,
        action,
    };

    vec![
        notice(
            1,
            NoticeKind::Alert,
            Priority::High,
            "Emissões acima do limite",
            "Suas emissões de energia deste mês excederam o limite estabelecido em 15%.",
            at(2023, 6, 18, 10, 30),
            false,
            Some("/monitoring"),
        ),
        notice(
            2,
            NoticeKind::Info,
            Priority::Medium,
            "Novo projeto de compensação disponível",
            "Projeto de reflorestamento na Amazônia com créditos verificados.",
            at(2023, 6, 15, 14, 20),
            true,
            Some("/compensation"),
        ),
        notice(
            3,
            NoticeKind::Success,
            Priority::Low,
            "Registro na blockchain confirmado",
            "Seu último registro de emissões foi confirmado na blockchain Ethereum.",
            at(2023, 6, 12, 9, 15),
            true,
            Some("/registry"),
        ),
        notice(
            4,
            NoticeKind::Warning,
            Priority::Medium,
            "Tokens prestes a expirar",
            "5 dos seus tokens de carbono expiram em 30 dias.",
            at(2023, 6, 10, 16, 45),
            false,
            Some("/tokenization"),
        ),
        notice(
            5,
            NoticeKind::Info,
            Priority::Low,
            "Atualização do sistema",
            "Nova versão da plataforma disponível com melhorias no dashboard.",
            at(2023, 6, 8, 11, 0),
            true,
            None,
        ),
        notice(
            6,
            NoticeKind::Success,
            Priority::Low,
            "Compensação realizada com sucesso",
            "Sua compensação de 850 kg CO₂ foi registrada na blockchain.",
            at(2023, 6, 5, 14, 30),
            true,
            Some("/compensation"),
        ),
    ]
}
