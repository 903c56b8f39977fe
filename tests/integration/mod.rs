mod fetchers;
mod ingestion;
