use clap::Parser;
use log::info;
use std::error::Error;

use machiyomi::backend::extensions::{self, ExtensionFilter};
use machiyomi::backend::mangadex::MangaList;
use machiyomi::config::{Cli, Command, DownloadCommand, ExtensionCommand, LibraryCommand};
use machiyomi::{
    Config, DownloadIndex, ExtensionRegistry, Language, LibraryData, LibraryStore, MangaDex,
    PageDownloader, Settings,
};

const LIST_LIMIT: u32 = 20;
const CHAPTER_LIMIT: u32 = 500;

struct App {
    config: Config,
    library: LibraryStore,
    index: DownloadIndex,
    settings: Settings,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            library: LibraryStore::new(config.library_path()),
            index: DownloadIndex::new(config.download_root()),
            settings: Settings::new(config.settings_path()),
            config,
        }
    }

    fn catalog(&self) -> Result<MangaDex, Box<dyn Error>> {
        Ok(MangaDex::new(&self.config)?)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::from_cli(&cli);
    info!("data directory: {}", config.data_dir.display());
    let mut app = App::new(config);

    match cli.command {
        Command::Search { query, lang } => {
            let list = app.catalog()?.search(&query, 0, LIST_LIMIT, Some(&lang)).await?;
            print_mangas(&list);
        }
        Command::Popular { lang } => {
            let list = app.catalog()?.popular(0, LIST_LIMIT, Some(&lang)).await?;
            print_mangas(&list);
        }
        Command::Latest { lang } => {
            let list = app.catalog()?.latest(0, LIST_LIMIT, Some(&lang)).await?;
            print_mangas(&list);
        }
        Command::Show { manga_id, lang } => show(&mut app, &manga_id, &lang).await?,
        Command::Library { action } => library(&mut app, action).await?,
        Command::Downloads { action } => downloads(&mut app, action).await?,
        Command::Extensions { action } => extension_index(&app, action).await?,
        Command::Language { code } => match code {
            None => println!("{}", app.settings.language().await.code()),
            Some(code) => {
                let language = Language::from_code(&code)
                    .ok_or_else(|| format!("unsupported language '{}', expected en, tr or ru", code))?;
                app.settings.set_language(language).await?;
            }
        },
    }
    Ok(())
}

fn print_mangas(list: &MangaList) {
    for (i, manga) in list.mangas.iter().enumerate() {
        println!(
            "{:>2}. {} | {} | Author: {} | Status: {}",
            i + 1,
            manga.id,
            manga.title,
            manga.author,
            manga.status
        );
    }
    println!("{} of {} results", list.mangas.len(), list.total);
}

async fn show(app: &mut App, manga_id: &str, languages: &[String]) -> Result<(), Box<dyn Error>> {
    let catalog = app.catalog()?;
    let manga = catalog.manga_detail(manga_id).await?;
    let chapters = catalog.chapters(manga_id, languages, 0, CHAPTER_LIMIT).await?;

    let saved = if app.library.is_in_library(manga_id).await {
        " [in library]"
    } else {
        ""
    };
    println!("{}{}", manga.title, saved);
    println!("Author: {} | Artist: {} | Status: {}", manga.author, manga.artist, manga.status);
    if !manga.tags.is_empty() {
        println!("Tags: {}", manga.tags.join(", "));
    }
    if !manga.description.is_empty() {
        println!("\n{}\n", manga.description);
    }

    let progress = app.library.read_progress(manga_id).await.unwrap_or_default();
    for chapter in &chapters.chapters {
        let read = if progress.is_read(&chapter.id) { "read" } else { "    " };
        let offline = if app.index.is_chapter_downloaded(manga_id, &chapter.id).await {
            "offline"
        } else {
            "       "
        };
        println!(
            "Ch. {:<6} {} {} {} | {} | {}",
            chapter.chapter, read, offline, chapter.id, chapter.title, chapter.scanlation_group
        );
    }
    Ok(())
}

async fn library(app: &mut App, action: LibraryCommand) -> Result<(), Box<dyn Error>> {
    match action {
        LibraryCommand::List => {
            let data = app.library.load().await;
            for entry in &data.mangas {
                let read = data
                    .read_progress
                    .get(&entry.id)
                    .map(|p| p.read_chapters.len())
                    .unwrap_or(0);
                println!(
                    "{} | {} | {} chapters read | added {}",
                    entry.id,
                    entry.title,
                    read,
                    entry.added_at.format("%Y-%m-%d")
                );
            }
        }
        LibraryCommand::Add { manga_id } => {
            let manga = app.catalog()?.manga_detail(&manga_id).await?;
            app.library.add_manga(&manga).await?;
            info!("added {} to the library", manga.title);
        }
        LibraryCommand::Remove { manga_id } => {
            app.library.remove_manga(&manga_id).await?;
            info!("removed {} from the library", manga_id);
        }
        LibraryCommand::Read {
            manga_id,
            chapter_id,
        } => {
            app.library.mark_chapter_read(&manga_id, &chapter_id).await?;
        }
        LibraryCommand::Import { file } => {
            let data: LibraryData = serde_json::from_slice(&tokio::fs::read(&file).await?)?;
            let count = data.mangas.len();
            app.library.save(data).await?;
            info!("imported {} titles from {}", count, file.display());
        }
    }
    Ok(())
}

async fn downloads(app: &mut App, action: DownloadCommand) -> Result<(), Box<dyn Error>> {
    match action {
        DownloadCommand::Path => {
            println!("{}", app.index.ensure_root().await?.display());
        }
        DownloadCommand::List => {
            let data = app.library.load().await;
            for manga in app.index.downloaded_mangas(data).await {
                println!("{} | {} | {} chapters", manga.id, manga.title, manga.chapter_count);
            }
        }
        DownloadCommand::Chapter {
            manga_id,
            chapter_id,
            data_saver,
        } => {
            let pages = app.catalog()?.chapter_pages(&chapter_id).await?;
            let urls = pages.page_urls(data_saver);
            info!("downloading {} pages of chapter {}", urls.len(), chapter_id);
            let downloader = PageDownloader::new(app.index.clone())?;
            let paths = downloader.download_chapter(&urls, &manga_id, &chapter_id).await?;
            println!("{} pages in {}", paths.len(), app.index.chapter_dir(&manga_id, &chapter_id)?.display());
        }
        DownloadCommand::Page {
            url,
            manga_id,
            chapter_id,
            index,
        } => {
            let downloader = PageDownloader::new(app.index.clone())?;
            let path = downloader.download_page(&url, &manga_id, &chapter_id, index).await?;
            println!("{}", path.display());
        }
        DownloadCommand::Pages {
            manga_id,
            chapter_id,
        } => {
            for url in app.index.downloaded_page_urls(&manga_id, &chapter_id).await {
                println!("{}", url);
            }
        }
        DownloadCommand::Delete {
            manga_id,
            chapter_id,
        } => {
            app.index.delete_chapter(&manga_id, &chapter_id).await?;
            info!("deleted chapter {} of {}", chapter_id, manga_id);
        }
    }
    Ok(())
}

async fn extension_index(app: &App, action: ExtensionCommand) -> Result<(), Box<dyn Error>> {
    let mut registry = ExtensionRegistry::new(&app.config, app.settings.clone())?;
    match action {
        ExtensionCommand::List {
            search,
            lang,
            installed,
            hide_nsfw,
        } => {
            let catalog = registry.fetch_catalog().await;
            let filter = ExtensionFilter {
                search,
                lang,
                installed_only: installed,
                hide_nsfw,
            };
            let installed = registry.installed().await;
            let shown = registry.filter(&catalog, &filter).await;
            for ext in &shown {
                let mark = if installed.contains(&ext.pkg) { "*" } else { " " };
                let nsfw = if ext.is_nsfw() { " (18+)" } else { "" };
                println!("{} [{}] {} {} v{}{}", mark, ext.lang, ext.name, ext.pkg, ext.version, nsfw);
            }
            let codes = extensions::languages(&catalog);
            let languages: Vec<&str> = codes
                .iter()
                .map(|code| extensions::language_name(code))
                .collect();
            println!(
                "{} of {} extensions, languages: {}",
                shown.len(),
                catalog.len(),
                languages.join(", ")
            );
        }
        ExtensionCommand::Install { pkg } => registry.install(&pkg).await?,
        ExtensionCommand::Uninstall { pkg } => registry.uninstall(&pkg).await?,
    }
    Ok(())
}
