// src/notify/render.rs - Message bodies per channel

use crate::models::NotifyData;

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CONVERGENCE: &str = "convergence";

fn tag_lines(data: &NotifyData, separator: &str, newline: &str) -> String {
    data.tags
        .iter()
        .map(|(k, v)| format!("{}{}{}", k, separator, v))
        .collect::<Vec<_>>()
        .join(newline)
}

fn timestamp(data: &NotifyData) -> String {
    data.time.format(TIME_FORMAT).to_string()
}

pub fn sms_content(data: &NotifyData) -> String {
    if data.is_free_text() {
        return data.msg.replace('\n', "\r\n");
    }
    format!(
        "{}  {}\r\n{}  {}  {}\r\nns: {}\r\n{} \r\nvalue: {:.2} \r\ntime: {}",
        data.alarm_name,
        data.level,
        data.host,
        data.measurement,
        data.expression,
        data.ns,
        tag_lines(data, "\t:  ", "\r\n"),
        data.value,
        timestamp(data)
    )
}

/// Empty for free-text messages.
pub fn wechat_title(data: &NotifyData) -> String {
    if data.is_free_text() {
        return String::new();
    }
    format!("Alarm: {}  {}", data.alarm_name, data.level)
}

pub fn wechat_content(data: &NotifyData) -> String {
    if data.is_free_text() {
        return data.msg.clone();
    }
    let ip = if data.ip.is_empty() {
        String::new()
    } else {
        format!("ip: {}\n", data.ip)
    };
    format!(
        "content:\nmeasurement:  {}\nns: {}\n{}{}\nvalue: {:.2} \ntime: {}",
        data.measurement,
        data.ns,
        ip,
        tag_lines(data, ":\t  ", "\n"),
        data.value,
        timestamp(data)
    )
}

pub fn mail_subject(data: &NotifyData, prefix: &str) -> String {
    let subject = if data.is_free_text() {
        data.alarm_name.clone()
    } else {
        format!("{}   {}   is  {}", data.host, data.measurement, data.level)
    };
    if prefix.is_empty() {
        subject
    } else {
        format!("{} {}", prefix, subject)
    }
}

/// HTML body; the level is coloured green when healthy and red otherwise.
pub fn mail_body(data: &NotifyData) -> String {
    if data.is_free_text() {
        let text = format!(
            "{} {}\nNs:  {}\nalert too many\n{}",
            data.alarm_name, CONVERGENCE, data.ns, data.msg
        );
        return text.replace('\n', "</br>");
    }

    let color = if data.level.is_ok() { "green" } else { "red" };
    format!(
        "{}\t<font style=\"color:{}\">{}</font></br></br>ns: {}</br>ip: {}</br>{} </br>value: {:.2} </br></br>time: {}",
        data.alarm_name,
        color,
        data.level,
        data.ns,
        data.ip,
        tag_lines(data, ":\t", "</br>"),
        data.value,
        timestamp(data)
    )
}
