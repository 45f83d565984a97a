use super::CommandDefinition;
use crate::budget::CategorizationRule;
use crate::cli::core::{usage, CommandError, CommandResult, ShellContext};
use crate::cli::output;
use crate::currency::Money;
use crate::ledger::{BudgetPeriod, BudgetRule, Category};

pub(crate) fn definitions() -> Vec<CommandDefinition> {
    vec![
        CommandDefinition::new(
            "category-add",
            "Create a category, optionally under a parent",
            "category-add <name> [parent]",
            cmd_category_add,
        ),
        CommandDefinition::new("categories", "Show the category tree", "categories", cmd_categories),
        CommandDefinition::new(
            "budget-set",
            "Attach a spending limit to a category",
            "budget-set <category> <limit> <weekly|monthly|quarterly|yearly>",
            cmd_budget_set,
        ),
        CommandDefinition::new(
            "rule-add",
            "Categorize new transactions whose memo matches a pattern",
            "rule-add <category> <memo-pattern>",
            cmd_rule_add,
        ),
    ]
}

fn find_category(context: &ShellContext, name: &str) -> Result<Category, CommandError> {
    context
        .manager
        .store()
        .category_by_name(name)
        .ok_or_else(|| CommandError::InvalidArguments(format!("Unknown category `{name}`.")))
}

fn cmd_category_add(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (name, parent) = match args {
        [name] => (*name, None),
        [name, parent] => (*name, Some(find_category(context, parent)?.id)),
        _ => return Err(usage("category-add <name> [parent]")),
    };
    let category = context.manager.add_category(name, parent)?;
    let path = context
        .manager
        .store()
        .category_tree()
        .path_name(category.id)
        .unwrap_or(category.name);
    output::success(format!("Category `{path}` created."));
    Ok(())
}

fn cmd_categories(context: &mut ShellContext, _args: &[&str]) -> CommandResult {
    let tree = context.manager.store().category_tree();
    if tree.is_empty() {
        output::info("No categories yet. Use `category-add` to create one.");
        return Ok(());
    }
    output::section("Categories");
    let mut stack: Vec<(&Category, usize)> = tree.roots().into_iter().rev().map(|c| (c, 0)).collect();
    while let Some((category, depth)) = stack.pop() {
        let budget = category
            .budget
            .as_ref()
            .map(|rule| format!("  [{} {}]", rule.limit, rule.period))
            .unwrap_or_default();
        output::row(format!("{}{}{budget}", "  ".repeat(depth), category.name));
        stack.extend(tree.children(category.id).into_iter().rev().map(|c| (c, depth + 1)));
    }
    Ok(())
}

fn cmd_budget_set(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let [name, limit, period] = args else {
        return Err(usage("budget-set <category> <limit> <weekly|monthly|quarterly|yearly>"));
    };
    let category = find_category(context, name)?;
    let period = period.parse::<BudgetPeriod>()?;
    let limit = Money::parse(limit, context.manager.config().base_currency.clone())?;
    let updated = context
        .manager
        .set_budget(category.id, Some(BudgetRule::new(limit, period)), category.version)?;
    if let Some(rule) = updated.budget {
        output::success(format!(
            "Budget for `{}` set to {} {}.",
            updated.name, rule.limit, rule.period
        ));
    }
    Ok(())
}

fn cmd_rule_add(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let [name, pattern] = args else {
        return Err(usage("rule-add <category> <memo-pattern>"));
    };
    let category = find_category(context, name)?;
    context
        .manager
        .add_rule(CategorizationRule::new(category.id).memo(pattern)?)?;
    output::success(format!("Memos matching `{pattern}` now file under `{}`.", category.name));
    Ok(())
}
