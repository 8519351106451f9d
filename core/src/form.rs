use std::collections::BTreeSet;

use crate::config::WrapperConfig;
use crate::markup::Element;
use crate::schema::{Group, ParameterSpec, Schema, title_case};
use crate::script::ClientBehavior;
use crate::ticket::TicketRegistry;
use crate::widget::{Built, SubmitButton, WidgetBuilder};

/// Everything the page needs from one assembly pass.
#[derive(Debug, Clone)]
pub struct AssembledForm {
    pub form: Element,
    /// Client behaviors wired into the rendered widgets.
    pub behaviors: BTreeSet<ClientBehavior>,
    /// Submit actions in schema order, including those of skipped groups.
    pub buttons: Vec<SubmitButton>,
}

/// Human label for a destination: `dry_run` becomes `Dry Run`.
pub fn label_text(dest: &str) -> String {
    title_case(&dest.replace('_', " "))
}

pub fn assemble(
    schema: &Schema,
    config: &WrapperConfig,
    registry: &TicketRegistry,
) -> AssembledForm {
    let builder = WidgetBuilder::new(registry, config);
    let mut behaviors = BTreeSet::new();
    let mut buttons = Vec::new();

    let mut form = Element::new("form")
        .attr("method", "post")
        .attr("enctype", "multipart/form-data")
        .attr("class", "form")
        .attr("name", &config.form_name);
    if let Some(description) = &schema.description {
        form.push(Element::new("p").attr("class", "description").child(description.as_str()));
    }

    for group in &schema.groups {
        if group.params.is_empty() {
            continue;
        }
        if config.skip_groups.contains(&group.title) {
            tracing::debug!(group = %group.title, "group hidden from layout");
            buttons.extend(
                group
                    .params
                    .iter()
                    .filter(|spec| spec.is_submit_action(&config.submit_actions))
                    .map(|spec| SubmitButton {
                        dest: spec.name.clone(),
                        kind: spec.action,
                    }),
            );
            continue;
        }

        let mut rows = Vec::new();
        for spec in &group.params {
            match builder.build(spec) {
                Built::Widget(widget) => {
                    behaviors.extend(widget.behaviors.iter().cloned());
                    rows.push(Row {
                        spec,
                        widget: widget.to_element(),
                    });
                }
                Built::Submit(button) => buttons.push(button),
                Built::Skip(_) => {}
            }
        }
        if rows.is_empty() {
            continue;
        }
        let section = if config.use_tables {
            table_section(group, &rows)
        } else {
            grid_section(group, &rows)
        };
        form.push(section);
    }

    form.push(button_bar(&buttons));
    if let Some(epilog) = &schema.epilog {
        form.push(Element::new("p").attr("class", "epilog").child(epilog.as_str()));
    }

    AssembledForm {
        form,
        behaviors,
        buttons,
    }
}

struct Row<'a> {
    spec: &'a ParameterSpec,
    widget: Element,
}

impl Row<'_> {
    fn label(&self) -> Element {
        Element::new("label")
            .attr("for", &self.spec.name)
            .child(label_text(&self.spec.name))
    }

    fn help(&self) -> Element {
        let mut help = Element::new("span").attr("class", "help");
        if let Some(text) = self.spec.formatted_help() {
            help.push(text);
        }
        help
    }
}

fn heading(tag: &str, group: &Group) -> Element {
    let mut heading = Element::new(tag).child(group.title.as_str());
    if let Some(description) = &group.description {
        heading.push(Element::new("br"));
        heading.push(Element::new("i").child(description.as_str()));
    }
    heading
}

fn grid_section(group: &Group, rows: &[Row<'_>]) -> Element {
    let mut fieldset = Element::new("fieldset")
        .attr("class", "group")
        .child(heading("legend", group));
    for (index, row) in rows.iter().enumerate() {
        let line = index + 1;
        fieldset.push(
            row.label()
                .attr("style", format!("grid-area: {line} / 1")),
        );
        fieldset.push(
            Element::new("div")
                .attr("class", "item")
                .attr("style", format!("grid-area: {line} / 2"))
                .child(row.widget.clone()),
        );
        fieldset.push(row.help().attr("style", format!("grid-area: {line} / 3")));
    }
    fieldset
}

fn table_section(group: &Group, rows: &[Row<'_>]) -> Element {
    let mut table = Element::new("table")
        .attr("class", "group")
        .child(heading("caption", group));
    for row in rows {
        table.push(
            Element::new("tr")
                .child(Element::new("td").child(row.label()))
                .child(Element::new("td").child(row.widget.clone()))
                .child(Element::new("td").child(row.help())),
        );
    }
    table
}

fn button_bar(buttons: &[SubmitButton]) -> Element {
    let mut bar = Element::new("div").attr("class", "buttons");
    for button in buttons {
        bar.push(
            Element::new("input")
                .attr("type", "submit")
                .flag("formnovalidate")
                .attr("name", &button.dest)
                .attr("value", label_text(&button.dest)),
        );
    }
    bar.push(Element::new("input").attr("type", "submit").attr("value", "Submit"));
    bar.push(Element::new("input").attr("type", "reset").attr("value", "Reset"));
    bar
}
