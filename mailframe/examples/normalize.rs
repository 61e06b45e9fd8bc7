/// Run the normalization pipeline on an HTML email and print the result.
///
/// Usage: cargo run --example normalize -- input.html [width] [--dark] [--preview]
///
/// The normalized markup goes to stdout, the messages the page would post to
/// the host go to stderr.
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;
use std::{env, fs, process};

use mailframe::{
    encode_html_payload, Command, EstimatedLayout, Page, PageEvent, PipelineConfig, Viewport,
};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <input.html> [width] [--dark] [--preview]", args[0]);
        process::exit(1);
    }

    let input = &args[1];
    let width: f32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(375.0);
    let dark = args.iter().any(|a| a == "--dark");
    let preview = args.iter().any(|a| a == "--preview");

    let html = fs::read_to_string(input).unwrap_or_else(|e| {
        eprintln!("Cannot read {} as UTF-8: {}", input, e);
        process::exit(1);
    });
    // The host hands over the message as a UTF-8 string, base64-encoded.
    let payload = encode_html_payload(&html);

    let posted: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = Rc::clone(&posted);

    let layout = EstimatedLayout::new(Viewport::new(width, width * 16.0 / 9.0));
    let mut page = Page::new(layout, PipelineConfig::default());
    page.attach_transport(move |json: String| sink.borrow_mut().push(json));
    page.mount();

    let now = Instant::now();
    let commands = [
        Command::SetDarkMode(dark),
        Command::SetPreviewMode(preview),
        Command::SetHtml(payload),
    ];
    for command in &commands {
        if let Err(e) = page.eval_script(&command.to_script(), now) {
            eprintln!("{} failed: {}", command.name(), e);
            process::exit(1);
        }
    }

    // Drive the debounce timers until nothing is pending.
    while let Some(deadline) = page.next_deadline() {
        page.tick(deadline);
    }

    println!("{}", page.to_html());

    for json in posted.borrow().iter() {
        match PageEvent::from_json(json) {
            Ok(PageEvent::HeightChange(h)) => eprintln!("height: {h}px"),
            Ok(event) => eprintln!("{event:?}"),
            Err(e) => eprintln!("bad message {json}: {e}"),
        }
    }
    if let Some(outcome) = page.last_resize() {
        eprintln!(
            "resize: scaled={} skipped={}",
            outcome.scaled,
            outcome.skipped.len()
        );
    }
}
