use crate::auth::ProfileView;
use crate::compensation::{CompensationProject, CompensationView, PAYMENT_METHODS};
use crate::format::{self, escape_html};
use crate::monitoring::{HistoryEntry, MonitoringView};
use crate::models::EmissionSource;
use crate::notifications::{NoticeKind, Notification, NotificationCounts, Priority, ReadFilter, relative_label};
use crate::registry::{HashVerification, Network, RecordStatus, RegistryRecord, RegistrySummary};
use crate::state::{Toast, ToastKind};
use crate::stats::DashboardStats;
use crate::tokenization::TokenizationView;
use chrono::NaiveDateTime;
use std::fmt::Write;

/// What every signed-in page shows around its content.
#[derive(Debug, Clone, Default)]
pub struct PageChrome {
    pub user_name: String,
    pub unread: usize,
    pub toast: Option<Toast>,
}

const NAV: [(&str, &str, &str); 7] = [
    ("dashboard", "/dashboard", "Dashboard"),
    ("monitoring", "/monitoring", "Monitoramento"),
    ("tokenization", "/tokenization", "Tokenização"),
    ("compensation", "/compensation", "Compensação"),
    ("registry", "/registry", "Registro Blockchain"),
    ("notifications", "/notifications", "Notificações"),
    ("profile", "/profile", "Perfil"),
];

fn render_toast(toast: Option<&Toast>) -> String {
    match toast {
        Some(toast) => {
            let kind = match toast.kind {
                ToastKind::Success => "success",
                ToastKind::Error => "error",
                ToastKind::Info => "info",
            };
            format!(
                r#"<div class="toast {kind}" role="status">{}</div>"#,
                escape_html(&toast.message)
            )
        }
        None => String::new(),
    }
}

fn page(chrome: &PageChrome, active: &str, title: &str, content: &str) -> String {
    let mut nav = String::new();
    for (key, href, label) in NAV {
        let class = if key == active { " class=\"active\"" } else { "" };
        let badge = if key == "notifications" && chrome.unread > 0 {
            format!(r#" <span class="badge">{}</span>"#, chrome.unread)
        } else {
            String::new()
        };
        let _ = write!(nav, r#"<a href="{href}"{class}>{label}{badge}</a>"#);
    }

    LAYOUT_HTML
        .replace("{{TITLE}}", title)
        .replace("{{NAV}}", &nav)
        .replace("{{USER}}", &escape_html(&chrome.user_name))
        .replace("{{TOAST}}", &render_toast(chrome.toast.as_ref()))
        .replace("{{CONTENT}}", content)
}

fn stat(label: &str, value: &str) -> String {
    format!(
        r#"<div class="stat"><span class="label">{label}</span><span class="value">{value}</span></div>"#
    )
}

fn source_options(sources: &[EmissionSource]) -> String {
    let mut out = String::from(r#"<option value="">Selecione</option>"#);
    for source in sources {
        if let Some(id) = &source.id {
            let _ = write!(
                out,
                r#"<option value="{}">{}</option>"#,
                escape_html(id.as_str()),
                escape_html(&source.description)
            );
        }
    }
    out
}

pub fn render_login(toast: Option<&Toast>) -> String {
    LOGIN_HTML.replace("{{TOAST}}", &render_toast(toast))
}

pub fn render_dashboard(chrome: &PageChrome, stats: &DashboardStats) -> String {
    let mut content = String::from(r#"<header><h1>Dashboard</h1></header><section class="panel">"#);
    content.push_str(&stat(
        "Emissões de Energia",
        &format!("{} kg CO₂", format::number(stats.energy_emissions)),
    ));
    content.push_str(&stat(
        "Emissões da Frota",
        &format!("{} kg CO₂", format::number(stats.fleet_emissions)),
    ));
    content.push_str(&stat("Tokens Disponíveis", &stats.available_tokens.to_string()));
    content.push_str(&stat(
        "Emissões Compensadas",
        &format!("{} kg CO₂", format::number(stats.compensated_emissions)),
    ));
    content.push_str("</section>");

    let peak = stats.monthly_trend.iter().copied().fold(0.0_f64, f64::max);
    content.push_str(r#"<section class="card"><h2>Tendência mensal</h2><div class="bars">"#);
    for (label, total) in stats.monthly_labels.iter().zip(&stats.monthly_trend) {
        let height = if peak > 0.0 { total / peak * 100.0 } else { 0.0 };
        let _ = write!(
            content,
            r#"<div class="bar"><span class="fill" style="height:{height:.0}%" title="{} kg CO₂"></span><span class="chart-label">{label}</span></div>"#,
            format::number(*total)
        );
    }
    content.push_str("</div></section>");

    content.push_str(r#"<section class="card"><h2>Atividades recentes</h2>"#);
    if stats.recent_activities.is_empty() {
        content.push_str(r#"<p class="hint">Nenhuma atividade registrada.</p>"#);
    } else {
        content.push_str("<table><thead><tr><th>Data</th><th>Tipo</th><th>Descrição</th><th>Valor</th></tr></thead><tbody>");
        for activity in &stats.recent_activities {
            let _ = write!(
                content,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&format::date(&activity.date)),
                activity.kind,
                escape_html(&activity.description),
                escape_html(&activity.value)
            );
        }
        content.push_str("</tbody></table>");
    }
    content.push_str("</section>");

    page(chrome, "dashboard", "Dashboard", &content)
}

fn history_table(title: &str, unit: &str, rows: &[HistoryEntry]) -> String {
    let mut out = format!(r#"<section class="card"><h2>{title}</h2>"#);
    if rows.is_empty() {
        out.push_str(r#"<p class="hint">Nenhum registro encontrado.</p></section>"#);
        return out;
    }
    let _ = write!(
        out,
        "<table><thead><tr><th>Data</th><th>Fonte</th><th>Consumo ({unit})</th><th>Fator</th><th>Emissões (kg CO₂)</th></tr></thead><tbody>"
    );
    for row in rows {
        let _ = write!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&format::date(&row.date)),
            escape_html(&row.source),
            format::number(row.consumption),
            row.factor,
            format::number(row.emissions)
        );
    }
    out.push_str("</tbody></table></section>");
    out
}

pub fn render_monitoring(chrome: &PageChrome, view: &MonitoringView) -> String {
    let mut content = String::from(r#"<header><h1>Monitoramento de Emissões</h1></header>"#);

    for (category, title, unit, sources) in [
        ("energy", "Registrar consumo de energia", "kWh", &view.energy_sources),
        ("fleet", "Registrar consumo da frota", "litros", &view.fleet_sources),
    ] {
        let _ = write!(
            content,
            r#"<section class="card"><h2>{title}</h2>
<form method="post" action="/monitoring/emissions" class="grid-form">
  <input type="hidden" name="category" value="{category}" />
  <label>Consumo ({unit})<input name="consumption" inputmode="decimal" required /></label>
  <label>Fonte<select name="source_id">{}</select></label>
  <label>Data<input type="date" name="date" /></label>
  <label>Método de coleta<input name="collection_method" /></label>
  <button type="submit">Salvar</button>
</form></section>"#,
            source_options(sources)
        );
    }

    content.push_str(&history_table("Histórico de energia", "kWh", &view.history.energy));
    content.push_str(&history_table("Histórico da frota", "litros", &view.history.fleet));

    content.push_str(r#"<section class="card"><h2>Fontes de emissão</h2><table><thead><tr><th>Tipo</th><th>Descrição</th><th></th></tr></thead><tbody>"#);
    for source in &view.sources {
        let Some(id) = &source.id else { continue };
        let id = escape_html(id.as_str());
        let _ = write!(
            content,
            r#"<tr><td colspan="2"><form method="post" action="/monitoring/sources/{id}/update" class="inline">
<input name="source_type" value="{}" /><input name="description" value="{}" /><button type="submit">Atualizar</button></form></td>
<td><form method="post" action="/monitoring/sources/{id}/delete"><button class="danger" type="submit">Excluir</button></form></td></tr>"#,
            escape_html(&source.source_type),
            escape_html(&source.description)
        );
    }
    content.push_str(
        r#"</tbody></table>
<form method="post" action="/monitoring/sources" class="grid-form">
  <label>Tipo<select name="source_type"><option value="">Selecione</option><option>Energia</option><option>Frota de Veículos</option></select></label>
  <label>Descrição<input name="description" /></label>
  <button type="submit">Nova fonte</button>
</form></section>"#,
    );

    page(chrome, "monitoring", "Monitoramento", &content)
}

pub fn render_tokenization(chrome: &PageChrome, view: &TokenizationView) -> String {
    let mut content = String::from(r#"<header><h1>Tokenização</h1></header><section class="panel">"#);
    content.push_str(&stat("Saldo de tokens", &view.balance.to_string()));
    content.push_str(&stat("Projetos", &view.projects.len().to_string()));
    content.push_str("</section>");

    content.push_str(r#"<section class="card"><h2>Projetos</h2><div class="cards">"#);
    let mut project_options = String::from(r#"<option value="">Selecione</option>"#);
    for project in &view.projects {
        let Some(id) = &project.id else { continue };
        let id = escape_html(id.as_str());
        let name = escape_html(&project.name);
        let _ = write!(project_options, r#"<option value="{id}">{name}</option>"#);
        let verified = if project.verified { r#"<span class="tag">Verificado</span>"# } else { "" };
        let _ = write!(
            content,
            r#"<article class="stat"><h3>{name} {verified}</h3><p class="hint">{}</p>
<p>{} tokens disponíveis · {} por token · {} kg CO₂ reduzidos</p>
<form method="post" action="/tokenization/buy" class="inline">
  <input type="hidden" name="project_id" value="{id}" />
  <input type="hidden" name="available" value="{}" />
  <input name="amount" inputmode="numeric" placeholder="Quantidade" />
  <select name="payment_method"><option value="">Pagamento</option><option value="card">Cartão</option><option value="pix">PIX</option><option value="crypto">Cripto</option></select>
  <button type="submit">Comprar</button>
</form></article>"#,
            escape_html(&project.description),
            project.tokens_available,
            format::currency(project.price_per_token),
            format::number(project.total_reduction),
            project.tokens_available
        );
    }
    content.push_str("</div></section>");

    let _ = write!(
        content,
        r#"<section class="card"><h2>Emitir tokens</h2>
<form method="post" action="/tokenization/issue" class="grid-form">
  <label>Projeto<select name="project_id">{project_options}</select></label>
  <label>Redução (kg CO₂)<input name="reduction" inputmode="numeric" /></label>
  <label>Tokens<input name="tokens" inputmode="numeric" /></label>
  <button type="submit">Emitir</button>
</form></section>
<section class="card"><h2>Novo projeto</h2>
<form method="post" action="/tokenization/projects" class="grid-form">
  <label>Nome<input name="name" /></label>
  <label>Tipo<select name="kind"><option value="">Selecione</option><option value="reflorestamento">Reflorestamento</option><option value="energia-renovavel">Energia Renovável</option><option value="conservacao">Conservação</option></select></label>
  <label>Descrição<input name="description" /></label>
  <label>Local<input name="location" /></label>
  <label>Redução (kg CO₂)<input name="reduction" inputmode="numeric" /></label>
  <label>Tokens<input name="tokens" inputmode="numeric" /></label>
  <label>Preço por token<input name="price" placeholder="R$ 0,00" /></label>
  <label>Status<select name="status"><option value="">Selecione</option><option value="verificado">Verificado</option><option value="pendente">Pendente</option></select></label>
  <button type="submit">Cadastrar</button>
</form></section>"#
    );

    content.push_str(r#"<section class="card"><div class="chart-header"><h2>Histórico</h2><a class="button" href="/tokenization/export.csv">Exportar CSV</a></div>"#);
    if view.history.is_empty() {
        content.push_str(r#"<p class="hint">Nenhuma transação encontrada.</p>"#);
    } else {
        content.push_str("<table><thead><tr><th>Data</th><th>Tipo</th><th>Quantidade</th><th>Projeto</th></tr></thead><tbody>");
        for entry in &view.history {
            let _ = write!(
                content,
                "<tr><td>{}</td><td>{}</td><td>{:+}</td><td>{}</td></tr>",
                escape_html(&format::date(&entry.date)),
                entry.kind.label(),
                entry.amount,
                escape_html(&entry.project)
            );
        }
        content.push_str("</tbody></table>");
    }
    content.push_str("</section>");

    page(chrome, "tokenization", "Tokenização", &content)
}

fn project_cards(projects: &[CompensationProject]) -> String {
    let mut out = String::from(r#"<div class="cards">"#);
    for project in projects {
        let verified = if project.verified { r#"<span class="tag">Verificado</span>"# } else { "" };
        let _ = write!(
            out,
            r#"<article class="stat"><h3>{} {verified}</h3><p class="hint">{} · {}</p><p>{}</p><p>{} por token · {} tokens disponíveis</p><p class="hint">{}</p></article>"#,
            escape_html(&project.name),
            escape_html(&project.type_name),
            escape_html(&project.location),
            escape_html(&project.description),
            format::currency(project.cost_per_token),
            project.available_tokens,
            project.impact
        );
    }
    out.push_str("</div>");
    out
}

pub fn render_compensation(
    chrome: &PageChrome,
    view: &CompensationView,
    search: Option<&(String, Vec<CompensationProject>)>,
) -> String {
    let mut content = String::from(r#"<header><h1>Compensação de Emissões</h1></header><section class="panel">"#);
    content.push_str(&stat("Saldo de tokens", &view.balance.to_string()));
    content.push_str(&stat(
        "Total compensado",
        &format!("{} kg CO₂", format::number(view.totals.compensated_kg)),
    ));
    content.push_str(&stat("Tokens utilizados", &view.totals.tokens.to_string()));
    content.push_str(&stat("Investimento", &format::currency(view.totals.cost)));
    content.push_str(&stat("Árvores equivalentes", &view.totals.trees_equivalent.to_string()));
    content.push_str(&stat(
        "Energia limpa",
        &format!("{} kWh", format::number(view.totals.clean_energy_kwh)),
    ));
    content.push_str("</section>");

    let mut project_options = String::from(r#"<option value="">Selecione</option>"#);
    for project in &view.projects {
        if let Some(id) = &project.id {
            let _ = write!(
                project_options,
                r#"<option value="{}">{}</option>"#,
                escape_html(id.as_str()),
                escape_html(&project.name)
            );
        }
    }
    let mut emission_options = String::from(r#"<option value="">Selecione</option>"#);
    for option in &view.emissions {
        let _ = write!(
            emission_options,
            r#"<option value="{}">{} ({} tokens)</option>"#,
            escape_html(option.id.as_str()),
            escape_html(&option.label),
            option.tokens_needed
        );
    }
    let mut payment_options = String::from(r#"<option value="">Selecione</option>"#);
    for method in PAYMENT_METHODS {
        let value = serde_json::to_value(method)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        let _ = write!(payment_options, r#"<option value="{value}">{}</option>"#, method.label());
    }

    let _ = write!(
        content,
        r#"<section class="card"><h2>Nova compensação</h2>
<form method="post" action="/compensation" class="grid-form">
  <label>Projeto<select name="project_id">{project_options}</select></label>
  <label>Emissão<select name="emission_id">{emission_options}</select></label>
  <label>Pagamento<select name="payment_method">{payment_options}</select></label>
  <button type="submit">Compensar</button>
</form></section>"#
    );

    let query = search.map(|(query, _)| escape_html(query)).unwrap_or_default();
    let _ = write!(
        content,
        r#"<section class="card"><div class="chart-header"><h2>Projetos</h2>
<form method="get" action="/compensation" class="inline"><input name="q" value="{query}" placeholder="Buscar projetos" /><button type="submit">Buscar</button></form></div>"#
    );
    match search {
        Some((_, found)) if found.is_empty() => {
            content.push_str(r#"<p class="hint">Nenhum projeto encontrado.</p>"#);
        }
        Some((_, found)) => content.push_str(&project_cards(found)),
        None => content.push_str(&project_cards(&view.projects)),
    }
    content.push_str("</section>");

    content.push_str(r#"<section class="card"><div class="chart-header"><h2>Histórico</h2><a class="button" href="/compensation/export.csv">Exportar CSV</a></div>"#);
    if view.history.is_empty() {
        content.push_str(r#"<p class="hint">Nenhuma compensação realizada.</p>"#);
    } else {
        content.push_str("<table><thead><tr><th>Data</th><th>Projeto</th><th>Tokens</th><th>CO₂ (kg)</th><th>Custo</th><th>Certificado</th><th>Impacto</th></tr></thead><tbody>");
        for record in &view.history {
            let _ = write!(
                content,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&format::date(&record.date)),
                escape_html(&record.project),
                record.tokens,
                format::number(record.emissions),
                format::currency(record.cost),
                escape_html(&record.certificate),
                escape_html(&record.impact)
            );
        }
        content.push_str("</tbody></table>");
    }
    content.push_str("</section>");

    page(chrome, "compensation", "Compensação", &content)
}

fn verification_panel(check: &HashVerification, network: Network) -> String {
    match check {
        HashVerification::Verified { hash, block, gas_used } => {
            let explorer = network
                .explorer_url(hash)
                .map(|url| format!(r#"<a href="{}" target="_blank" rel="noopener">Ver no explorador</a>"#, escape_html(&url)))
                .unwrap_or_default();
            format!(
                r#"<div class="result ok"><strong>Transação verificada com sucesso!</strong><p>Rede: {} · Bloco: {block} · Gas: {gas_used}</p><p class="mono">{}</p>{explorer}</div>"#,
                network.display_name(),
                escape_html(hash)
            )
        }
        HashVerification::NotFound { hash } => format!(
            r#"<div class="result error"><strong>Transação não encontrada ou inválida</strong><p class="mono">{}</p></div>"#,
            escape_html(hash)
        ),
    }
}

pub fn render_registry(
    chrome: &PageChrome,
    records: &[&RegistryRecord],
    summary: &RegistrySummary,
    network: Network,
    search: &str,
    check: Option<&HashVerification>,
) -> String {
    let mut content = String::from(r#"<header><h1>Registro Blockchain</h1></header><section class="panel">"#);
    content.push_str(&stat("Registros", &summary.total.to_string()));
    content.push_str(&stat("Confirmados", &summary.confirmed.to_string()));
    content.push_str(&stat("Pendentes", &summary.pending.to_string()));
    content.push_str(&stat(
        "Emissões registradas",
        &format!("{} kg CO₂", format::number(summary.total_emissions)),
    ));
    content.push_str("</section>");

    let mut networks = String::new();
    for option in [Network::Ethereum, Network::Polygon, Network::Bsc, Network::Hyperledger] {
        let value = serde_json::to_value(option)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        let selected = if option == network { " selected" } else { "" };
        let _ = write!(
            networks,
            r#"<option value="{value}"{selected}>{}</option>"#,
            option.display_name()
        );
    }
    let _ = write!(
        content,
        r#"<section class="card"><h2>Verificar transação</h2>
<form method="post" action="/registry/check" class="inline">
  <input name="hash" placeholder="0x..." />
  <select name="network">{networks}</select>
  <button type="submit">Verificar</button>
</form>{}</section>"#,
        check.map(|check| verification_panel(check, network)).unwrap_or_default()
    );

    let _ = write!(
        content,
        r#"<section class="card"><div class="chart-header"><h2>Registros</h2>
<form method="get" action="/registry" class="inline"><input name="q" value="{}" placeholder="Buscar" /><button type="submit">Buscar</button></form>
<form method="post" action="/registry/verify-all"><button type="submit">Verificar todos</button></form></div>"#,
        escape_html(search)
    );
    content.push_str("<table><thead><tr><th>Hash</th><th>Data</th><th>Tipo</th><th>Descrição</th><th>Emissões</th><th>Status</th><th>Bloco</th><th></th></tr></thead><tbody>");
    for record in records {
        let block = record.block.map(|block| block.to_string()).unwrap_or_else(|| "-".into());
        let action = match record.status {
            RecordStatus::Pending => format!(
                r#"<form method="post" action="/registry/{}/verify"><button type="submit">Verificar</button></form>"#,
                escape_html(&record.hash)
            ),
            RecordStatus::Confirmed => String::new(),
        };
        let _ = write!(
            content,
            r#"<tr><td class="mono" title="{}">{}</td><td>{}</td><td>{}</td><td>{}</td><td>{} kg</td><td>{}</td><td>{block}</td><td>{action}</td></tr>"#,
            escape_html(&record.hash),
            escape_html(&record.short_hash()),
            escape_html(&format::date(&record.date)),
            record.kind.label(),
            escape_html(&record.description),
            format::number(record.emissions),
            record.status.label()
        );
    }
    content.push_str("</tbody></table></section>");

    page(chrome, "registry", "Registro Blockchain", &content)
}

fn notice_icon(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::Alert => "⚠",
        NoticeKind::Info => "ℹ",
        NoticeKind::Success => "✓",
        NoticeKind::Warning => "⏳",
    }
}

pub fn render_notifications(
    chrome: &PageChrome,
    items: &[&Notification],
    counts: &NotificationCounts,
    priority: Option<Priority>,
    status: ReadFilter,
    now: NaiveDateTime,
) -> String {
    let mut content = String::from(r#"<header><h1>Notificações</h1></header><section class="panel">"#);
    content.push_str(&stat("Total", &counts.total.to_string()));
    content.push_str(&stat("Não lidas", &counts.unread.to_string()));
    content.push_str(&stat("Alta prioridade", &counts.high_priority_unread.to_string()));
    content.push_str("</section>");

    let mut priority_options = String::new();
    for (value, label, current) in [
        ("all", "Todas", priority.is_none()),
        ("high", "Alta", priority == Some(Priority::High)),
        ("medium", "Média", priority == Some(Priority::Medium)),
        ("low", "Baixa", priority == Some(Priority::Low)),
    ] {
        let selected = if current { " selected" } else { "" };
        let _ = write!(priority_options, r#"<option value="{value}"{selected}>{label}</option>"#);
    }
    let mut status_options = String::new();
    for (value, label, filter) in [
        ("all", "Todas", ReadFilter::All),
        ("unread", "Não lidas", ReadFilter::Unread),
        ("read", "Lidas", ReadFilter::Read),
    ] {
        let selected = if filter == status { " selected" } else { "" };
        let _ = write!(status_options, r#"<option value="{value}"{selected}>{label}</option>"#);
    }
    let _ = write!(
        content,
        r#"<section class="card"><div class="chart-header">
<form method="get" action="/notifications" class="inline">
  <select name="priority">{priority_options}</select>
  <select name="status">{status_options}</select>
  <button type="submit">Filtrar</button>
</form>
<form method="post" action="/notifications/read-all"><button type="submit">Marcar todas como lidas</button></form>
<form method="post" action="/notifications/clear"><button class="danger" type="submit">Limpar</button></form></div>"#
    );

    if items.is_empty() {
        content.push_str(r#"<p class="hint">Nenhuma notificação.</p>"#);
    }
    for item in items {
        let toggle = if item.read {
            format!(r#"<form method="post" action="/notifications/{}/unread"><button type="submit">Marcar como não lida</button></form>"#, item.id)
        } else {
            format!(r#"<form method="post" action="/notifications/{}/read"><button type="submit">Marcar como lida</button></form>"#, item.id)
        };
        let link = item
            .action
            .map(|href| format!(r#"<a href="{href}">Ver</a>"#))
            .unwrap_or_default();
        let _ = write!(
            content,
            r#"<article class="notice{}"><span class="icon">{}</span><div><h3>{}</h3><p>{}</p><p class="hint">{} · Prioridade {}</p></div>
<div class="inline">{link}{toggle}<form method="post" action="/notifications/{}/delete"><button class="danger" type="submit">Excluir</button></form></div></article>"#,
            if item.read { "" } else { " unread" },
            notice_icon(item.kind),
            escape_html(&item.title),
            escape_html(&item.message),
            relative_label(item.date, now),
            item.priority.label(),
            item.id
        );
    }
    content.push_str("</section>");

    page(chrome, "notifications", "Notificações", &content)
}

pub fn render_profile(chrome: &PageChrome, view: &ProfileView) -> String {
    let user = &view.user;
    let mut content = String::from(r#"<header><h1>Perfil</h1></header><section class="panel">"#);
    content.push_str(&stat(
        "Saldo de tokens",
        &view
            .token_balance
            .map(|balance| balance.to_string())
            .unwrap_or_else(|| "-".into()),
    ));
    let wallet = if user.wallet_address.is_empty() {
        "Não conectada".to_string()
    } else {
        escape_html(&user.wallet_address)
    };
    content.push_str(&stat("Carteira", &wallet));
    content.push_str("</section>");
    if !view.loaded_from_backend {
        content.push_str(r#"<p class="hint">Exibindo os dados salvos localmente.</p>"#);
    }

    let _ = write!(
        content,
        r#"<section class="card"><h2>Dados pessoais</h2>
<form method="post" action="/profile" class="grid-form">
  <label>Nome<input name="name" value="{}" /></label>
  <label>E-mail<input type="email" name="email" value="{}" /></label>
  <label>Empresa<input value="{}" disabled /></label>
  <button type="submit">Salvar</button>
</form></section>
<section class="card"><h2>Alterar senha</h2>
<form method="post" action="/profile/password" class="grid-form">
  <label>Senha atual<input type="password" name="current_password" /></label>
  <label>Nova senha<input type="password" name="new_password" /></label>
  <label>Confirmar nova senha<input type="password" name="confirm_password" /></label>
  <button type="submit">Alterar senha</button>
</form></section>
<section class="card"><h2>Carteira</h2>
<form method="post" action="/profile/wallet"><button type="submit">Conectar carteira</button></form></section>"#,
        escape_html(&user.name),
        escape_html(&user.email),
        escape_html(&user.company)
    );

    page(chrome, "profile", "Perfil", &content)
}

const STYLE: &str = r#"
    @import url('https://fonts.googleapis.com/css2?family=Space+Grotesk:wght@400;500;600&family=Fraunces:wght@600&display=swap');

    :root {
      --bg-1: #eef5ec;
      --bg-2: #cfe6c8;
      --ink: #24302a;
      --accent: #2e8b57;
      --accent-2: #2f4858;
      --danger: #c63b2b;
      --card: rgba(255, 255, 255, 0.9);
      --shadow: 0 24px 60px rgba(47, 72, 88, 0.16);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: radial-gradient(circle at top, var(--bg-2), transparent 60%),
        linear-gradient(135deg, var(--bg-1), #e3f1df 60%, #f4f9f2 100%);
      color: var(--ink);
      font-family: "Space Grotesk", "Trebuchet MS", sans-serif;
    }

    nav {
      display: flex;
      flex-wrap: wrap;
      align-items: center;
      gap: 6px;
      padding: 14px 24px;
      background: var(--accent-2);
    }

    nav a {
      color: #dfe9e4;
      text-decoration: none;
      padding: 8px 14px;
      border-radius: 999px;
      font-weight: 500;
    }

    nav a.active {
      background: white;
      color: var(--accent-2);
    }

    nav .user {
      margin-left: auto;
      color: white;
      display: flex;
      gap: 12px;
      align-items: center;
    }

    .badge {
      background: var(--danger);
      color: white;
      border-radius: 999px;
      padding: 1px 8px;
      font-size: 0.8rem;
    }

    .app {
      width: min(1100px, 100%);
      margin: 28px auto;
      padding: 0 18px 48px;
      display: grid;
      gap: 24px;
      animation: rise 600ms ease;
    }

    h1 {
      font-family: "Fraunces", "Georgia", serif;
      font-weight: 600;
      font-size: clamp(1.8rem, 4vw, 2.6rem);
      margin: 0;
    }

    .panel,
    .cards {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
      gap: 16px;
    }

    .card,
    .stat {
      background: var(--card);
      border-radius: 20px;
      padding: 18px;
      border: 1px solid rgba(47, 72, 88, 0.08);
      box-shadow: var(--shadow);
    }

    .stat {
      display: grid;
      gap: 8px;
    }

    .stat .label {
      font-size: 0.8rem;
      text-transform: uppercase;
      letter-spacing: 0.12em;
      color: #7b857f;
    }

    .stat .value {
      font-size: 1.5rem;
      font-weight: 600;
      color: var(--accent-2);
    }

    .chart-header {
      display: flex;
      flex-wrap: wrap;
      align-items: center;
      justify-content: space-between;
      gap: 16px;
    }

    .bars {
      display: flex;
      align-items: flex-end;
      gap: 12px;
      height: 220px;
    }

    .bar {
      flex: 1;
      height: 100%;
      display: flex;
      flex-direction: column;
      justify-content: flex-end;
      align-items: center;
      gap: 6px;
    }

    .bar .fill {
      width: 100%;
      background: var(--accent);
      border-radius: 10px 10px 4px 4px;
      min-height: 2px;
    }

    .chart-label {
      color: #7a746d;
      font-size: 0.8rem;
    }

    table {
      width: 100%;
      border-collapse: collapse;
    }

    th,
    td {
      text-align: left;
      padding: 10px 8px;
      border-bottom: 1px solid rgba(47, 72, 88, 0.08);
    }

    .grid-form {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
      gap: 12px;
      align-items: end;
    }

    .inline {
      display: flex;
      flex-wrap: wrap;
      gap: 8px;
      align-items: center;
    }

    label {
      display: grid;
      gap: 6px;
      font-size: 0.9rem;
    }

    input,
    select {
      border: 1px solid rgba(47, 72, 88, 0.2);
      border-radius: 12px;
      padding: 10px 12px;
      font: inherit;
    }

    button,
    .button {
      appearance: none;
      border: none;
      border-radius: 999px;
      padding: 10px 18px;
      font: inherit;
      font-weight: 600;
      cursor: pointer;
      background: var(--accent);
      color: white;
      text-decoration: none;
    }

    button.danger {
      background: var(--danger);
    }

    .tag {
      background: var(--bg-2);
      color: var(--accent);
      border-radius: 999px;
      padding: 2px 10px;
      font-size: 0.75rem;
    }

    .notice {
      display: grid;
      grid-template-columns: 32px 1fr auto;
      gap: 12px;
      padding: 14px 0;
      border-bottom: 1px solid rgba(47, 72, 88, 0.08);
    }

    .notice.unread h3 {
      color: var(--accent);
    }

    .mono {
      font-family: ui-monospace, monospace;
    }

    .result {
      margin-top: 12px;
      padding: 12px;
      border-radius: 12px;
    }

    .result.ok {
      background: #e3f4e7;
    }

    .result.error {
      background: #fbe4e1;
    }

    .hint {
      margin: 0;
      color: #6f6a65;
      font-size: 0.9rem;
    }

    .toast {
      position: fixed;
      right: 18px;
      bottom: 18px;
      padding: 14px 18px;
      border-radius: 14px;
      color: white;
      box-shadow: var(--shadow);
      animation: rise 300ms ease;
    }

    .toast.success {
      background: #2d7a4b;
    }

    .toast.error {
      background: var(--danger);
    }

    .toast.info {
      background: var(--accent-2);
    }

    @keyframes rise {
      from {
        opacity: 0;
        transform: translateY(18px);
      }
      to {
        opacity: 1;
        transform: translateY(0);
      }
    }
"#;

const LAYOUT_HTML: &str = r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{{TITLE}} · Carbon Dashboard</title>
  <link rel="stylesheet" href="/assets/style.css" />
</head>
<body>
  <nav>{{NAV}}<span class="user">{{USER}}<form method="post" action="/logout"><button type="submit">Sair</button></form></span></nav>
  <main class="app">{{CONTENT}}</main>
  {{TOAST}}
</body>
</html>
"#;

const LOGIN_HTML: &str = r#"<!DOCTYPE html>
<html lang="pt-BR">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Entrar · Carbon Dashboard</title>
  <link rel="stylesheet" href="/assets/style.css" />
</head>
<body>
  <main class="app">
    <header><h1>Carbon Dashboard</h1><p class="hint">Monitore, tokenize e compense as emissões da sua empresa.</p></header>
    <section class="panel">
      <section class="card">
        <h2>Entrar</h2>
        <form method="post" action="/login" class="grid-form">
          <label>E-mail<input type="email" name="email" /></label>
          <label>Senha<input type="password" name="password" /></label>
          <button type="submit">Entrar</button>
        </form>
      </section>
      <section class="card">
        <h2>Cadastro</h2>
        <form method="post" action="/register" class="grid-form">
          <label>Nome completo<input name="name" /></label>
          <label>E-mail<input type="email" name="email" /></label>
          <label>Perfil<select name="profile">
            <option value="">Selecione</option>
            <option value="empresa">Empresa</option>
            <option value="auditor">Auditor</option>
            <option value="investidor">Investidor</option>
          </select></label>
          <label>Senha<input type="password" name="password" /></label>
          <label>Confirmar senha<input type="password" name="confirm_password" /></label>
          <button type="submit">Cadastrar</button>
        </form>
      </section>
    </section>
  </main>
  {{TOAST}}
</body>
</html>
"#;

/// Shared stylesheet served at `/assets/style.css`.
pub fn stylesheet() -> &'static str {
    STYLE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CurrentUser;
    use crate::models::EntityId;

    fn chrome() -> PageChrome {
        PageChrome {
            user_name: "Ana <admin>".into(),
            unread: 2,
            toast: Some(Toast {
                kind: ToastKind::Error,
                message: "Falhou & voltou".into(),
            }),
        }
    }

    #[test]
    fn layout_escapes_user_text_and_shows_badge() {
        let html = render_profile(
            &chrome(),
            &ProfileView {
                user: CurrentUser {
                    id: EntityId::new("1").unwrap(),
                    name: "Ana".into(),
                    email: "a@b.c".into(),
                    company: String::new(),
                    wallet_address: String::new(),
                },
                token_balance: Some(4),
                loaded_from_backend: true,
            },
        );
        assert!(html.contains("Ana &lt;admin&gt;"));
        assert!(html.contains(r#"<span class="badge">2</span>"#));
        assert!(html.contains(r#"<div class="toast error" role="status">Falhou &amp; voltou</div>"#));
        assert!(html.contains("Não conectada"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn dashboard_renders_trend_and_empty_activity() {
        let stats = DashboardStats {
            energy_emissions: 300.0,
            fleet_emissions: 50.0,
            available_tokens: 3,
            compensated_emissions: 0.0,
            monthly_trend: vec![0.0, 0.0, 0.0, 0.0, 100.0, 200.0],
            monthly_labels: ["Out", "Nov", "Dez", "Jan", "Fev", "Mar"].map(String::from).to_vec(),
            recent_activities: Vec::new(),
        };
        let html = render_dashboard(&PageChrome::default(), &stats);
        assert!(html.contains("300 kg CO₂"));
        assert!(html.contains("height:100%"));
        assert!(html.contains("height:50%"));
        assert!(html.contains("Nenhuma atividade registrada."));
    }

    #[test]
    fn login_page_without_toast() {
        let html = render_login(None);
        assert!(html.contains(r#"action="/register""#));
        assert!(!html.contains("{{TOAST}}"));
    }
}
