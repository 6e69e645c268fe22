//! Message texts (Telegram Markdown, Russian).

use chrono::NaiveDateTime;

const TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Escapes the characters legacy Telegram Markdown treats as markup.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Material fields shown in status and task messages.
#[derive(Debug, Clone, Default)]
pub struct MaterialSummary {
    pub grade: String,
    pub supplier: String,
    pub certificate_number: String,
    pub heat_number: String,
    pub size: String,
    pub quantity: String,
}

impl MaterialSummary {
    fn render(&self) -> String {
        format!(
            "📦 *Материал:* {}\n🏭 *Поставщик:* {}\n📄 *Сертификат:* {}\n🔥 *Плавка:* {}\n📏 *Размер:* {}\n⚖️ *Количество:* {}",
            escape_markdown(&self.grade),
            escape_markdown(&self.supplier),
            escape_markdown(&self.certificate_number),
            escape_markdown(&self.heat_number),
            escape_markdown(&self.size),
            escape_markdown(&self.quantity),
        )
    }
}

fn status_emoji(status: &str) -> &'static str {
    match status {
        "pending_qc" => "⏳",
        "in_qc" => "🔍",
        "approved" | "lab_complete" => "✅",
        "rejected" => "❌",
        "in_lab" => "🧪",
        "in_production" => "⚙️",
        "completed" => "🎉",
        _ => "📋",
    }
}

fn status_label(status: &str) -> &str {
    match status {
        "pending_qc" => "Ожидает ОТК",
        "in_qc" => "В ОТК",
        "approved" => "Одобрено",
        "rejected" => "Отклонено",
        "in_lab" => "В лаборатории",
        "lab_complete" => "Лаборатория завершена",
        "in_production" => "В производстве",
        "completed" => "Завершено",
        other => other,
    }
}

fn task_label(task: &str) -> (&'static str, &str) {
    match task {
        "qc_inspection" => ("🔍", "Проверка ОТК"),
        "lab_testing" => ("🧪", "Лабораторные испытания"),
        "production_prep" => ("⚙️", "Подготовка к производству"),
        "final_inspection" => ("📋", "Финальная проверка"),
        "warehouse_receipt" => ("📦", "Приемка на склад"),
        other => ("📋", other),
    }
}

pub fn status_update(
    material: &MaterialSummary,
    old_status: &str,
    new_status: &str,
    at: NaiveDateTime,
    urgent: bool,
) -> String {
    let message = format!(
        "🔄 *Изменение статуса материала*\n\n{}\n\n📊 *Статус изменен:*\n{} {} → {} {}\n\n🕐 *Время:* {}",
        material.render(),
        status_emoji(old_status),
        escape_markdown(status_label(old_status)),
        status_emoji(new_status),
        escape_markdown(status_label(new_status)),
        at.format(TIME_FORMAT),
    );
    if urgent {
        format!("🚨 *СРОЧНО!* 🚨\n\n{message}")
    } else {
        message
    }
}

pub fn task_assignment(
    assignee: &str,
    task_type: &str,
    material: &MaterialSummary,
    additional_info: Option<&str>,
    at: NaiveDateTime,
    urgent: bool,
) -> String {
    let (emoji, task) = task_label(task_type);
    let mut message = format!(
        "{emoji} *Новая задача назначена*\n\n👤 *Исполнитель:* {}\n📋 *Тип задачи:* {}\n\n{}\n\n🕐 *Время назначения:* {}",
        escape_markdown(assignee),
        escape_markdown(task),
        material.render(),
        at.format(TIME_FORMAT),
    );
    if let Some(info) = additional_info.filter(|i| !i.trim().is_empty()) {
        message.push_str("\n\n📝 *Дополнительная информация:*\n");
        message.push_str(&escape_markdown(info));
    }
    if urgent {
        format!("🚨 *СРОЧНАЯ ЗАДАЧА!* 🚨\n\n{message}")
    } else {
        message
    }
}

pub fn urgent_alert(
    alert_type: &str,
    text: &str,
    material: Option<&MaterialSummary>,
    at: NaiveDateTime,
) -> String {
    let mut message = format!(
        "🚨 *СРОЧНОЕ УВЕДОМЛЕНИЕ* 🚨\n\n⚠️ *Тип:* {}\n\n📝 *Сообщение:*\n{}\n\n",
        escape_markdown(alert_type),
        escape_markdown(text),
    );
    if let Some(material) = material {
        message.push_str(&material.render());
        message.push_str("\n\n");
    }
    message.push_str(&format!("🕐 *Время:* {}", at.format(TIME_FORMAT)));
    message
}

/// Result of certificate processing as reported to the uploader.
#[derive(Debug, Clone)]
pub struct CertificateSummary<'a> {
    pub certificate_id: i64,
    pub original_filename: &'a str,
    pub grade: Option<&'a str>,
    pub heat_number: Option<&'a str>,
    /// `None` on success, the last error otherwise.
    pub error: Option<&'a str>,
    /// Set when the certificate was indexed but its thumbnail failed.
    pub preview_error: Option<&'a str>,
}

pub fn certificate_processed(summary: &CertificateSummary<'_>, at: NaiveDateTime) -> String {
    let mut message = match summary.error {
        None => "✅ *Сертификат обработан*\n\n".to_string(),
        Some(_) => "❌ *Ошибка обработки сертификата*\n\n".to_string(),
    };
    message.push_str(&format!(
        "📄 *Файл:* {}\n🔢 *ID:* {}\n",
        escape_markdown(summary.original_filename),
        summary.certificate_id
    ));
    if let Some(grade) = summary.grade {
        message.push_str(&format!("📦 *Марка:* {}\n", escape_markdown(grade)));
    }
    if let Some(heat) = summary.heat_number {
        message.push_str(&format!("🔥 *Плавка:* {}\n", escape_markdown(heat)));
    }
    if let Some(error) = summary.error {
        message.push_str(&format!("\n⚠️ *Ошибка:* {}\n", escape_markdown(error)));
    }
    if let Some(error) = summary.preview_error {
        message.push_str(&format!("\n🖼 *Превью не создано:* {}\n", escape_markdown(error)));
    }
    message.push_str(&format!("\n🕐 *Время:* {}", at.format(TIME_FORMAT)));
    message
}
