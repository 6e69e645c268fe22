use anyhow::Result;
use metalqms::index::FieldFilters;
use metalqms::{SearchQuery, SearchService, SuggestionField};

use super::{print_json, Context};
use crate::cli::{SearchArgs, SuggestArgs, SuggestField};

fn service(ctx: &Context) -> SearchService {
    SearchService::new(
        ctx.db.clone(),
        ctx.config.search.clone(),
        ctx.config.media_url.clone(),
    )
}

pub fn run(ctx: &Context, args: SearchArgs) -> Result<()> {
    let query = SearchQuery {
        text: args.text,
        filters: FieldFilters {
            grade: args.grade,
            heat_number: args.heat_number,
            certificate_number: args.certificate_number,
            supplier: args.supplier,
        },
        limit: args.limit,
    };
    let results = service(ctx).query(&query)?;
    print_json(&results)
}

pub fn suggest(ctx: &Context, args: SuggestArgs) -> Result<()> {
    let field = match args.field {
        SuggestField::Grade => SuggestionField::Grade,
        SuggestField::HeatNumber => SuggestionField::HeatNumber,
        SuggestField::Supplier => SuggestionField::Supplier,
        SuggestField::Certificate => SuggestionField::Certificate,
        SuggestField::All => SuggestionField::All,
    };
    let suggestions = service(ctx).autocomplete(&args.partial, field)?;
    print_json(&suggestions)
}
